//! C6 — per-language dispatch.
//!
//! Re-expresses the original system's dynamic module loading as a fixed
//! registry of handler values, one per supported language (spec §9
//! "Dynamic module loading -> registry of language handlers"). Each handler
//! prepares on-disk source if the language needs it, builds the command(s)
//! to run, and cleans up afterward.

use std::collections::HashMap;

use crate::runner::{self, RunSpec};
use crate::scratch::ScratchDir;
use crate::types::{ExecutionResult, Language};

/// One step of a (possibly multi-step, e.g. Java) execution.
pub enum Plan {
    /// A single process invocation produces the final result.
    Single {
        program: &'static str,
        args: Vec<String>,
    },
    /// Two sequential invocations: compile, then run — only the second
    /// runs if the first exits zero (Java).
    CompileThenRun {
        compile_program: &'static str,
        compile_args: Vec<String>,
        run_program: &'static str,
        run_args: Vec<String>,
    },
}

/// One on-disk thing a handler created, to be removed once execution ends.
pub enum ScratchEntry {
    /// A single file, removed with `unlink`.
    File(std::path::PathBuf),
    /// A directory (and everything in it), removed recursively.
    Dir(std::path::PathBuf),
}

/// Files/directories a handler created on disk, to be removed once
/// execution ends.
pub struct ScratchFiles(pub Vec<ScratchEntry>);

pub trait LanguageHandler: Send + Sync {
    /// Write source to disk if this language needs a file path rather than
    /// stdin/argv transport; returns the execution plan and any files that
    /// must be unlinked afterward.
    fn prepare(&self, scratch: &ScratchDir, source: &[u8]) -> std::io::Result<(Plan, ScratchFiles)>;
}

fn base_env() -> HashMap<String, String> {
    let mut env = HashMap::new();
    env.insert("PYTHONUNBUFFERED".to_string(), "1".to_string());
    env
}

/// JavaScript (and, by dispatch, TypeScript) — module-evaluation mode,
/// source passed as a command-line argument, no on-disk file.
pub struct JsHandler;

impl LanguageHandler for JsHandler {
    fn prepare(&self, _scratch: &ScratchDir, source: &[u8]) -> std::io::Result<(Plan, ScratchFiles)> {
        let code = String::from_utf8_lossy(source).into_owned();
        Ok((
            Plan::Single {
                program: "node",
                args: vec!["--input-type=module".to_string(), "-e".to_string(), code],
            },
            ScratchFiles(Vec::new()),
        ))
    }
}

/// Python 3 — unbuffered, source passed as `-c`, no on-disk file.
pub struct PythonHandler;

impl LanguageHandler for PythonHandler {
    fn prepare(&self, _scratch: &ScratchDir, source: &[u8]) -> std::io::Result<(Plan, ScratchFiles)> {
        let code = String::from_utf8_lossy(source).into_owned();
        Ok((
            Plan::Single {
                program: "python3",
                args: vec!["-u".to_string(), "-c".to_string(), code],
            },
            ScratchFiles(Vec::new()),
        ))
    }
}

/// PHP — needs a real file; prefixes `<?php` if the source omits it.
pub struct PhpHandler;

impl LanguageHandler for PhpHandler {
    fn prepare(&self, scratch: &ScratchDir, source: &[u8]) -> std::io::Result<(Plan, ScratchFiles)> {
        let text = String::from_utf8_lossy(source);
        let contents = if text.trim_start().starts_with("<?php") {
            text.into_owned()
        } else {
            format!("<?php\n{}", text)
        };

        let path = scratch.write_unique("source.php", contents.as_bytes())?;
        let path_str = path.to_string_lossy().into_owned();

        Ok((
            Plan::Single {
                program: "php",
                args: vec![path_str],
            },
            ScratchFiles(vec![ScratchEntry::File(path)]),
        ))
    }
}

/// Java — derive the class name from `public class NAME`, compile then run,
/// skipping the run step on a non-zero `javac` exit (spec §4.6).
///
/// `javac` requires a `public class NAME` source file to be named exactly
/// `NAME.java` — it hard-errors otherwise, regardless of `-d`. Since
/// `ScratchDir::unique_path` prefixes every file name to keep concurrent
/// executions collision-free, the source instead gets its own
/// uniquely-named directory (`ScratchDir::create_unique_dir`) and is
/// written inside it under its exact required name; `-d`/`-cp` both point
/// at that same directory.
pub struct JavaHandler;

impl LanguageHandler for JavaHandler {
    fn prepare(&self, scratch: &ScratchDir, source: &[u8]) -> std::io::Result<(Plan, ScratchFiles)> {
        let text = String::from_utf8_lossy(source);
        let class_name = extract_class_name(&text).unwrap_or_else(|| "Main".to_string());

        let exec_dir = scratch.create_unique_dir()?;
        let source_path = exec_dir.join(format!("{class_name}.java"));
        std::fs::write(&source_path, text.as_bytes())?;
        let dir = exec_dir.to_string_lossy().into_owned();

        Ok((
            Plan::CompileThenRun {
                compile_program: "javac",
                compile_args: vec![
                    "-d".to_string(),
                    dir.clone(),
                    source_path.to_string_lossy().into_owned(),
                ],
                run_program: "java",
                run_args: vec!["-cp".to_string(), dir, class_name],
            },
            ScratchFiles(vec![ScratchEntry::Dir(exec_dir)]),
        ))
    }
}

/// Extract `NAME` from a `public class NAME` declaration. Deliberately
/// simple (not a real parser) — matches the spec's "default Main" contract
/// for anything it can't confidently extract.
fn extract_class_name(source: &str) -> Option<String> {
    let idx = source.find("public class")?;
    let rest = &source[idx + "public class".len()..];
    let name: String = rest
        .trim_start()
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

pub fn handler_for(language: Language) -> Box<dyn LanguageHandler> {
    match language.dispatch_target() {
        Language::Javascript | Language::Typescript => Box::new(JsHandler),
        Language::Python => Box::new(PythonHandler),
        Language::Php => Box::new(PhpHandler),
        Language::Java => Box::new(JavaHandler),
    }
}

/// Execute a prepared plan, enforcing `deadline`/`max_output_bytes` at each
/// step, unlinking scratch files on every exit path (spec invariant 5).
pub async fn execute_plan(
    plan: Plan,
    files: ScratchFiles,
    scratch: &ScratchDir,
    deadline: std::time::Duration,
    max_output_bytes: usize,
) -> ExecutionResult {
    let env = base_env();
    let result = match plan {
        Plan::Single { program, args } => {
            let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
            runner::run(RunSpec {
                program,
                args: &arg_refs,
                cwd: Some(scratch.root()),
                env: &env,
                deadline,
                max_output_bytes,
            })
            .await
        }
        Plan::CompileThenRun {
            compile_program,
            compile_args,
            run_program,
            run_args,
        } => {
            let compile_refs: Vec<&str> = compile_args.iter().map(String::as_str).collect();
            let compiled = runner::run(RunSpec {
                program: compile_program,
                args: &compile_refs,
                cwd: Some(scratch.root()),
                env: &env,
                deadline,
                max_output_bytes,
            })
            .await;

            if compiled.exit_code != 0 {
                let mut compile_failure = compiled;
                compile_failure.phase = Some("compile".to_string());
                compile_failure
            } else {
                let run_refs: Vec<&str> = run_args.iter().map(String::as_str).collect();
                runner::run(RunSpec {
                    program: run_program,
                    args: &run_refs,
                    cwd: Some(scratch.root()),
                    env: &env,
                    deadline,
                    max_output_bytes,
                })
                .await
            }
        }
    };

    for entry in &files.0 {
        match entry {
            ScratchEntry::File(path) => scratch.unlink(path),
            ScratchEntry::Dir(path) => scratch.remove_dir(path),
        }
    }

    result
}
