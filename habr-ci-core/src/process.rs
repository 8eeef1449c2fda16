use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use command_group::{AsyncCommandGroup, AsyncGroupChild};
use log::{debug, info, warn};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use crate::error::{PipelineError, PipelineResult};

/// Quanto output teniamo in memoria per stream: la coda, dove di solito c'è l'errore
pub(crate) const OUTPUT_TAIL_LIMIT: usize = 16 * 1024;
pub(crate) const TRUNCATION_MARKER: &str = "...[truncated]...\n";
/// Dopo il SIGTERM al gruppo, quanto aspettare prima del SIGKILL
const TERMINATE_GRACE: Duration = Duration::from_secs(5);
/// Un nipote sopravvissuto può tenere aperte le pipe: oltre questo limite l'output viene abbandonato
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Un comando da eseguire: programma, argomenti e ambiente.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandSpec {
    /// Prefisso per le righe di output nei log (di solito il nome dello stage)
    pub label: String,
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub env: HashMap<String, String>,
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    pub fn new(label: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            env: HashMap::new(),
            timeout: None,
        }
    }

    /// Costruisce lo spec da un argv completo; `None` se argv è vuoto
    pub fn from_argv(label: impl Into<String>, argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self::new(label, program.clone()).args(args.iter().cloned()))
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn envs(mut self, env: &HashMap<String, String>) -> Self {
        self.env.extend(env.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
        .collect()
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " '{}'", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Risultato di un comando terminato (anche con errore)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandOutput {
    /// `None` se il processo è stato terminato da un segnale o dal timeout
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn with_exit_code(exit_code: i32) -> Self {
        Self {
            exit_code: Some(exit_code),
            ..Default::default()
        }
    }

    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    /// Ultime righe di stderr (o stdout se stderr è vuoto), per i messaggi d'errore
    pub fn diagnostic_tail(&self, max_lines: usize) -> String {
        let source = if self.stderr.trim().is_empty() { &self.stdout } else { &self.stderr };
        let lines: Vec<&str> = source.lines().filter(|it| !it.trim().is_empty()).collect();
        lines[lines.len().saturating_sub(max_lines)..].join("\n")
    }
}

/// Esecutore di comandi usato dagli stage.
///
/// `Err` solo quando il processo non può essere avviato; un exit code diverso da zero
/// è un `Ok` con `CommandOutput::success() == false`.
#[async_trait::async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, spec: &CommandSpec) -> PipelineResult<CommandOutput>;
}

/// Esegue i comandi come processi figli, con output in streaming sui log
#[derive(Debug, Default, Clone)]
pub struct ProcessRunner;

#[async_trait::async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, spec: &CommandSpec) -> PipelineResult<CommandOutput> {
        let started = Instant::now();
        let mut command = Command::new(&spec.program);
        command.args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.working_dir {
            command.current_dir(dir);
        }

        debug!("[{}] spawning: {}", spec.label, spec);
        // Gruppo di processi proprio: al timeout terminiamo anche i figli dello script
        let mut child = command.group_spawn()
            .map_err(|e| PipelineError::io(format!("cannot start '{}': {}", spec.program, e)))?;

        let stdout = child.inner().stdout.take()
            .map(|it| tokio::spawn(consume_lines(spec.label.clone(), it, false)));
        let stderr = child.inner().stderr.take()
            .map(|it| tokio::spawn(consume_lines(spec.label.clone(), it, true)));

        let (exit_code, timed_out) = match spec.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => (status?.code(), false),
                Err(_) => {
                    warn!("[{}] timed out after {}s, terminating its process group", spec.label, limit.as_secs_f32());
                    terminate_process_group(&mut child, TERMINATE_GRACE).await;
                    (None, true)
                }
            },
            None => (child.wait().await?.code(), false),
        };

        let stdout = join_output(&spec.label, stdout).await;
        let stderr = join_output(&spec.label, stderr).await;

        Ok(CommandOutput {
            exit_code,
            stdout,
            stderr,
            duration_ms: started.elapsed().as_millis() as u64,
            timed_out,
        })
    }
}

async fn join_output(label: &str, handle: Option<JoinHandle<String>>) -> String {
    let Some(mut handle) = handle else {
        return String::new();
    };
    match tokio::time::timeout(OUTPUT_DRAIN_GRACE, &mut handle).await {
        Ok(output) => output.unwrap_or_default(),
        Err(_) => {
            warn!("[{}] output pipe still open after the process ended, detaching", label);
            handle.abort();
            String::new()
        }
    }
}

/// SIGTERM al gruppo, attesa di `grace`, poi SIGKILL; il leader viene sempre raccolto
#[cfg(unix)]
async fn terminate_process_group(child: &mut AsyncGroupChild, grace: Duration) {
    use nix::errno::Errno;
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.inner().id() else {
        return;
    };
    let group = Pid::from_raw(-(pid as i32));

    match signal::kill(group, Signal::SIGTERM) {
        Err(e) if e != Errno::ESRCH => warn!("SIGTERM to process group {} failed: {}", pid, e),
        _ => {}
    }

    let deadline = tokio::time::Instant::now() + grace;
    while tokio::time::Instant::now() < deadline {
        if child.inner().try_wait().ok().flatten().is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    // Anche se il leader è uscito, qualche nipote può aver ignorato il SIGTERM
    match signal::kill(group, Signal::SIGKILL) {
        Err(e) if e != Errno::ESRCH => warn!("SIGKILL to process group {} failed: {}", pid, e),
        _ => {}
    }
    let _ = child.wait().await;
}

#[cfg(not(unix))]
async fn terminate_process_group(child: &mut AsyncGroupChild, _grace: Duration) {
    let _ = child.kill().await;
    let _ = child.wait().await;
}

/// Logga ogni riga e tiene solo la coda dell'output
async fn consume_lines<R>(label: String, reader: R, is_stderr: bool) -> String
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut collected = String::new();
    let mut truncated = false;

    while let Ok(Some(line)) = lines.next_line().await {
        // git e pip scrivono il progresso su stderr: non è un warning
        info!("[{}{}] {}", label, if is_stderr { "!" } else { "" }, line);
        collected.push_str(&line);
        collected.push('\n');
        if collected.len() > OUTPUT_TAIL_LIMIT {
            let mut start = collected.len() - OUTPUT_TAIL_LIMIT;
            while !collected.is_char_boundary(start) {
                start += 1;
            }
            collected.drain(..start);
            truncated = true;
        }
    }

    if truncated {
        collected.insert_str(0, TRUNCATION_MARKER);
    }
    collected
}
