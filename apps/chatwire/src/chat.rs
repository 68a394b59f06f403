use std::error::Error;
use std::io::Write;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

use chatwire_client::{AssistantMessage, ChatSession, ChatView, HttpBackend};

use crate::cli::ChatArgs;

/// Prints the reply as it grows. Each update carries the whole text so far;
/// only the unseen suffix is written.
#[derive(Default)]
struct TerminalView {
    shown: String,
}

impl TerminalView {
    fn write(text: &str) {
        let mut out = std::io::stdout().lock();
        let _ = out.write_all(text.as_bytes());
        let _ = out.flush();
    }
}

impl ChatView for TerminalView {
    fn thinking(&mut self) {
        self.shown.clear();
        Self::write("assistant: ");
    }

    fn show_partial(&mut self, text: &str) {
        match text.strip_prefix(self.shown.as_str()) {
            Some(suffix) => Self::write(suffix),
            None => Self::write(&format!("\n{text}")),
        }
        self.shown = text.to_string();
    }

    fn settled(&mut self, message: &AssistantMessage) {
        if message.is_error || message.content != self.shown {
            Self::write(&format!("\n{}", message.content));
        }
        Self::write("\n\n");
    }
}

pub(crate) async fn run(args: ChatArgs) -> Result<(), Box<dyn Error + Send + Sync>> {
    let token = if args.guest { None } else { args.token.clone() };
    let guest = token.is_none();
    let backend = Arc::new(HttpBackend::new(&args.server, token)?);

    let settings = backend.settings().await?;
    if guest && !settings.enable_guest_access {
        warn!("guest access is disabled on this server; replies will be refused");
    }
    let models = backend.models().await?;
    let model = args
        .model
        .clone()
        .or_else(|| models.first().map(|model| model.id.clone()));

    let mut session = ChatSession::new(backend.clone(), settings.max_message_length);
    if !guest {
        session = session.with_store(backend.clone());
    }
    if let Some(model) = model {
        session = session.with_model(model);
    }
    if let Some(conversation) = &args.conversation {
        let history = backend.history(conversation).await?;
        println!("(resuming {conversation}, {} messages)", history.len());
        session = session.resume(conversation.clone(), history);
    }

    if !settings.welcome_message.is_empty() {
        println!("{}", settings.welcome_message);
    }
    println!("/models lists models, /model <id> switches, /quit leaves.\n");

    let mut view = TerminalView::default();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        TerminalView::write("you: ");
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        match line {
            "/quit" | "/exit" => break,
            "/models" => {
                for model in &models {
                    println!("  {}  {}", model.id, model.name);
                }
                continue;
            }
            _ => {}
        }
        if let Some(id) = line.strip_prefix("/model ") {
            session.select_model(id.trim());
            continue;
        }
        match session.send(line, &mut view).await {
            Ok(_) => {}
            Err(err) if err.is_input_guard() => eprintln!("{err}"),
            Err(err) => warn!(error = %err, "message not sent"),
        }
    }

    if let Some(id) = session.conversation_id() {
        println!("conversation: {id}");
    }
    Ok(())
}
