//! Operator terminal behind a message-passing boundary.
//!
//! A single console task owns the terminal. Cycles send it [`ConsoleRequest`]s
//! and await the oneshot reply, so the request handler never blocks on
//! terminal I/O itself and at most one prompt is ever outstanding. Each read
//! runs on a blocking thread through a [`LineReader`]; for the real terminal
//! that is a rustyline editor whose tab completion draws on the vocabulary
//! sent with the prompt. Closing input (Ctrl+D) or Ctrl+C at the prompt
//! cancels the shutdown token.

use std::io;

use colored::{Color, ColoredString, Colorize};
use rustyline::completion::Completer;
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{Context, Editor, Helper};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::dispatch::Operator;
use crate::envelope::Tone;
use crate::session;

/// Work items for the console task.
#[derive(Debug)]
pub enum ConsoleRequest {
    Acknowledge {
        notice: String,
        done: oneshot::Sender<()>,
    },
    ReadLine {
        prompt: String,
        /// Completion words for this prompt.
        vocabulary: Vec<String>,
        reply: oneshot::Sender<Option<String>>,
    },
}

/// Blocking source of operator lines.
pub trait LineReader: Send + 'static {
    /// Show `prompt` and read one line. `Ok(None)` when input is closed.
    fn read_line(&mut self, prompt: &str, vocabulary: &[String]) -> io::Result<Option<String>>;
}

/// Cloneable handle to the console task.
#[derive(Clone, Debug)]
pub struct Console {
    tx: mpsc::Sender<ConsoleRequest>,
}

impl Console {
    pub fn new(tx: mpsc::Sender<ConsoleRequest>) -> Self {
        Self { tx }
    }

    /// Spawn the console task reading from `reader`.
    pub fn spawn<L: LineReader>(reader: L, shutdown: CancellationToken) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(8);
        let task = tokio::spawn(run_console(reader, rx, shutdown));
        (Self::new(tx), task)
    }
}

impl Operator for Console {
    async fn acknowledge(&self, notice: &str) {
        let (done, rx) = oneshot::channel();
        let request = ConsoleRequest::Acknowledge {
            notice: notice.to_string(),
            done,
        };
        if self.tx.send(request).await.is_ok() {
            let _ = rx.await;
        }
    }

    async fn read_command(&self, prompt: &str, vocabulary: &[String]) -> Option<String> {
        let (reply, rx) = oneshot::channel();
        let request = ConsoleRequest::ReadLine {
            prompt: prompt.to_string(),
            vocabulary: vocabulary.to_vec(),
            reply,
        };
        self.tx.send(request).await.ok()?;
        rx.await.ok().flatten()
    }

    fn report(&self, text: &str, tone: Tone) {
        println!("{}", paint(text, tone));
    }
}

/// Console color for a tone.
pub fn color(tone: Tone) -> Color {
    match tone {
        Tone::Neutral => Color::White,
        Tone::Success => Color::Green,
        Tone::Error => Color::Red,
    }
}

pub fn paint(text: &str, tone: Tone) -> ColoredString {
    text.color(color(tone))
}

/// Completes the word under the cursor from the agent's vocabulary.
/// Words are separated by single spaces, as PowerShell pipelines are typed.
#[derive(Debug, Default)]
pub struct VocabularyHelper {
    vocabulary: Vec<String>,
}

impl VocabularyHelper {
    pub fn new(vocabulary: Vec<String>) -> Self {
        Self { vocabulary }
    }

    pub fn set_vocabulary(&mut self, vocabulary: &[String]) {
        if self.vocabulary != vocabulary {
            self.vocabulary = vocabulary.to_vec();
        }
    }

    /// Start of the word ending at `pos` and the entries completing it.
    pub fn candidates(&self, line: &str, pos: usize) -> (usize, Vec<String>) {
        let head = line.get(..pos).unwrap_or(line);
        let start = head.rfind(' ').map_or(0, |i| i + 1);
        let words = session::completions(&self.vocabulary, &head[start..])
            .map(str::to_string)
            .collect();
        (start, words)
    }
}

impl Completer for VocabularyHelper {
    type Candidate = String;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<String>)> {
        Ok(self.candidates(line, pos))
    }
}

impl Hinter for VocabularyHelper {
    type Hint = String;
}

impl Highlighter for VocabularyHelper {}

impl Validator for VocabularyHelper {}

impl Helper for VocabularyHelper {}

/// The process terminal, read through a line editor with history.
pub struct Terminal {
    editor: Editor<VocabularyHelper, DefaultHistory>,
}

impl Terminal {
    pub fn new() -> rustyline::Result<Self> {
        let mut editor = Editor::new()?;
        editor.set_helper(Some(VocabularyHelper::default()));
        Ok(Self { editor })
    }
}

impl LineReader for Terminal {
    fn read_line(&mut self, prompt: &str, vocabulary: &[String]) -> io::Result<Option<String>> {
        if let Some(helper) = self.editor.helper_mut() {
            helper.set_vocabulary(vocabulary);
        }
        match self.editor.readline(prompt) {
            Ok(line) => {
                if !line.is_empty() {
                    let _ = self.editor.add_history_entry(line.as_str());
                }
                Ok(Some(line))
            }
            Err(ReadlineError::Eof | ReadlineError::Interrupted) => Ok(None),
            Err(ReadlineError::Io(e)) => Err(e),
            Err(e) => Err(io::Error::other(e.to_string())),
        }
    }
}

/// Serve console requests until every [`Console`] handle is dropped.
pub async fn run_console<L: LineReader>(
    reader: L,
    mut rx: mpsc::Receiver<ConsoleRequest>,
    shutdown: CancellationToken,
) {
    let mut reader = reader;

    while let Some(request) = rx.recv().await {
        match request {
            ConsoleRequest::Acknowledge { notice, done } => {
                let prompt = notice.as_str().red().to_string();
                let Some((back, line)) = read_line(reader, prompt, Vec::new(), &shutdown).await
                else {
                    break;
                };
                reader = back;
                if line.is_some() {
                    let _ = done.send(());
                }
            }
            ConsoleRequest::ReadLine {
                prompt,
                vocabulary,
                reply,
            } => {
                let prompt = prompt.as_str().blue().to_string();
                let Some((back, line)) = read_line(reader, prompt, vocabulary, &shutdown).await
                else {
                    break;
                };
                reader = back;
                if reply.send(line).is_err() {
                    warn!("Agent went away before the command could be delivered");
                }
            }
        }
    }
}

/// Read one line on a blocking thread and hand the reader back. `None` if
/// the reader was lost.
async fn read_line<L: LineReader>(
    reader: L,
    prompt: String,
    vocabulary: Vec<String>,
    shutdown: &CancellationToken,
) -> Option<(L, Option<String>)> {
    let task = tokio::task::spawn_blocking(move || {
        let mut reader = reader;
        let result = reader.read_line(&prompt, &vocabulary);
        (reader, result)
    });
    let (reader, result) = match task.await {
        Ok(pair) => pair,
        Err(e) => {
            warn!("Operator input task failed: {e}");
            shutdown.cancel();
            return None;
        }
    };
    let line = match result {
        Ok(Some(line)) => Some(line),
        Ok(None) => {
            info!("Operator input closed");
            shutdown.cancel();
            None
        }
        Err(e) => {
            warn!("Failed to read operator input: {e}");
            shutdown.cancel();
            None
        }
    };
    Some((reader, line))
}

#[cfg(test)]
mod tests {
    use std::io::BufRead;
    use std::sync::{Arc, Mutex};

    use super::*;

    /// Newline-separated input; records the vocabulary offered with each read.
    struct Piped {
        input: io::Cursor<&'static [u8]>,
        offered: Arc<Mutex<Vec<Vec<String>>>>,
    }

    impl LineReader for Piped {
        fn read_line(&mut self, _prompt: &str, vocabulary: &[String]) -> io::Result<Option<String>> {
            self.offered.lock().unwrap().push(vocabulary.to_vec());
            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                return Ok(None);
            }
            let trimmed = line.trim_end_matches(['\r', '\n']).len();
            line.truncate(trimmed);
            Ok(Some(line))
        }
    }

    fn console_over(
        input: &'static [u8],
    ) -> (Console, CancellationToken, Arc<Mutex<Vec<Vec<String>>>>) {
        let offered = Arc::new(Mutex::new(Vec::new()));
        let reader = Piped {
            input: io::Cursor::new(input),
            offered: offered.clone(),
        };
        let shutdown = CancellationToken::new();
        let (console, _task) = Console::spawn(reader, shutdown.clone());
        (console, shutdown, offered)
    }

    fn words(list: &[&str]) -> Vec<String> {
        list.iter().map(|w| (*w).to_string()).collect()
    }

    #[tokio::test]
    async fn test_lines_answer_prompts_in_order() {
        let (console, shutdown, _) = console_over(b"whoami\r\n\nhostname\n");
        assert_eq!(console.read_command("PS C:\\> ", &[]).await.as_deref(), Some("whoami"));
        assert_eq!(console.read_command("PS C:\\> ", &[]).await.as_deref(), Some(""));
        assert_eq!(console.read_command("PS C:\\> ", &[]).await.as_deref(), Some("hostname"));
        assert!(!shutdown.is_cancelled());
    }

    #[tokio::test]
    async fn test_acknowledge_consumes_one_line() {
        let (console, _shutdown, _) = console_over(b"\nipconfig\n");
        console.acknowledge("press ENTER").await;
        assert_eq!(console.read_command("> ", &[]).await.as_deref(), Some("ipconfig"));
    }

    #[tokio::test]
    async fn test_closed_input_cancels_shutdown() {
        let (console, shutdown, _) = console_over(b"");
        assert_eq!(console.read_command("> ", &[]).await, None);
        assert!(shutdown.is_cancelled());
        console.acknowledge("press ENTER").await;
    }

    #[tokio::test]
    async fn test_vocabulary_travels_with_each_prompt() {
        let (console, _shutdown, offered) = console_over(b"a\nb\n");
        console.read_command("> ", &words(&["Get-Item"])).await;
        console
            .read_command("> ", &words(&["Get-Item", "Set-Item"]))
            .await;
        assert_eq!(
            *offered.lock().unwrap(),
            [words(&["Get-Item"]), words(&["Get-Item", "Set-Item"])]
        );
    }

    #[test]
    fn test_completer_matches_word_under_cursor() {
        let helper = VocabularyHelper::new(words(&["Get-Item", "Get-ChildItem", "Set-Item"]));
        assert_eq!(
            helper.candidates("Get-", 4),
            (0, words(&["Get-Item", "Get-ChildItem"]))
        );
        assert_eq!(
            helper.candidates("dir | Set-", 10),
            (6, words(&["Set-Item"]))
        );
        assert_eq!(helper.candidates("Remove-", 7), (0, Vec::new()));
    }

    #[test]
    fn test_completer_follows_latest_vocabulary() {
        let mut helper = VocabularyHelper::default();
        assert!(helper.candidates("Get-", 4).1.is_empty());

        helper.set_vocabulary(&words(&["Get-Process"]));
        assert_eq!(helper.candidates("Get-", 4).1, words(&["Get-Process"]));

        helper.set_vocabulary(&words(&["Get-Service", "Get-Date"]));
        assert_eq!(
            helper.candidates("Get-", 4).1,
            words(&["Get-Service", "Get-Date"])
        );
    }

    #[test]
    fn test_tone_colors() {
        assert_eq!(color(Tone::Neutral), Color::White);
        assert_eq!(color(Tone::Success), Color::Green);
        assert_eq!(color(Tone::Error), Color::Red);
    }
}
