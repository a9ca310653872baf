//! Pluggable compile step.
//!
//! The build cache never knows how an artifact is produced. It hands the raw source bytes
//! to a [`Compile`] implementation and writes whatever comes back. Three implementations
//! ship with the crate:
//!
//! - [`CopyCompiler`]: identity, used in copy-only mode
//! - any `Fn(&[u8]) -> anyhow::Result<Vec<u8>>` closure
//! - [`CommandCompiler`]: pipes the source through an external program (e.g. a minifier)
//!
//! Compilation is synchronous and CPU-bound; the middleware runs it on the blocking pool.

use anyhow::{Context, Result, bail};
use std::io::Write;
use std::process::{Command, Stdio};

/// Transforms raw source bytes into artifact bytes.
pub trait Compile: Send + Sync {
    /// Compile `source`. An error fails the request's build.
    fn compile(&self, source: &[u8]) -> Result<Vec<u8>>;
}

impl<F> Compile for F
where
    F: Fn(&[u8]) -> Result<Vec<u8>> + Send + Sync,
{
    fn compile(&self, source: &[u8]) -> Result<Vec<u8>> {
        self(source)
    }
}

/// Identity compile step: the artifact is a byte-exact copy of its source.
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyCompiler;

impl Compile for CopyCompiler {
    fn compile(&self, source: &[u8]) -> Result<Vec<u8>> {
        Ok(source.to_vec())
    }
}

/// Runs an external program with the source on stdin and takes stdout as the artifact.
///
/// ```rust,no_run
/// use assetmill::compile::{Compile, CommandCompiler};
///
/// let minify = CommandCompiler::new("terser").args(["--compress", "--mangle"]);
/// let out = minify.compile(b"function  add(a, b) { return a + b; }")?;
/// # Ok::<(), anyhow::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct CommandCompiler {
    program: String,
    args: Vec<String>,
}

impl CommandCompiler {
    /// Create a compiler for `program` with no arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Build from an argv list (`["terser", "--compress"]`).
    pub fn from_argv(argv: &[String]) -> Result<Self> {
        let Some((program, args)) = argv.split_first() else {
            bail!("compile command must name a program");
        };
        Ok(Self::new(program.clone()).args(args.iter().cloned()))
    }

    /// Append arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// The command line, for logs and error messages.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Compile for CommandCompiler {
    fn compile(&self, source: &[u8]) -> Result<Vec<u8>> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to start compile command '{}'", self.display()))?;

        let mut stdin = child.stdin.take().context("compile command stdin was not captured")?;

        // Feed stdin from a separate thread so a program that streams its output cannot
        // deadlock against a full pipe
        let (output, written) = std::thread::scope(|scope| {
            let writer = scope.spawn(move || stdin.write_all(source));
            let output = child.wait_with_output();
            let written = writer
                .join()
                .unwrap_or_else(|_| Err(std::io::Error::other("stdin writer thread panicked")));
            (output, written)
        });

        let output = output
            .with_context(|| format!("Failed to run compile command '{}'", self.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "Compile command '{}' exited with {}: {}",
                self.display(),
                output.status,
                stderr.trim()
            );
        }

        // A program that exits successfully without reading all of stdin is fine; any
        // other write failure is not
        match written {
            Err(e) if e.kind() != std::io::ErrorKind::BrokenPipe => {
                return Err(e).context("Failed to write source to compile command");
            }
            _ => {}
        }

        Ok(output.stdout)
    }
}
