//! Terminal rendering of turns, threads and models

use colored::*;
use orchat_common::{ChatThread, Message, ModelDescriptor, ReasoningStep, Role, StepStatus};
use orchat_llm::{ChatEvent, TurnOutcome, TurnStatus};
use regex::Regex;
use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::LazyLock;
use termimad::MadSkin;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

static MARKDOWN_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\(([^)]+)\)").expect("valid link pattern"));

/// Replace Markdown links with OSC 8 hyperlinks for supported terminals.
pub fn add_osc8_hyperlinks(input: &str) -> String {
    MARKDOWN_LINK
        .replace_all(input, |caps: &regex::Captures| {
            let text = &caps[1];
            let url = &caps[2];
            format!("\x1b]8;;{}\x1b\\{}\x1b]8;;\x1b\\", url, text)
        })
        .to_string()
}

/// Incremental printer for the in-progress assistant message
#[derive(Default)]
struct DraftPrinter {
    printed: String,
    steps: HashMap<String, StepStatus>,
}

impl DraftPrinter {
    fn render(&mut self, draft: &Message) {
        for step in &draft.reasoning {
            self.render_step(step);
        }

        if let Some(delta) = draft.content.strip_prefix(self.printed.as_str()) {
            print!("{}", delta);
        } else {
            // content was reset by a tool round-trip or replaced by an apology
            println!();
            print!("{}", draft.content);
        }
        self.printed = draft.content.clone();
        let _ = io::stdout().flush();
    }

    fn render_step(&mut self, step: &ReasoningStep) {
        if self.steps.get(&step.id) == Some(&step.status) {
            return;
        }
        self.steps.insert(step.id.clone(), step.status);

        if !self.printed.is_empty() {
            println!();
        }
        match step.status {
            StepStatus::Pending | StepStatus::Active => {
                println!("{}", format!("🔍 {}", step.label).bright_yellow());
            }
            StepStatus::Complete => {
                println!("{}", format!("✅ {}", step.label).bright_green());
                if let Some(metadata) = &step.metadata {
                    for result in &metadata.search_results {
                        println!(
                            "   {} {}",
                            "•".bright_blue(),
                            add_osc8_hyperlinks(&format!("[{}]({})", result.title, result.url))
                        );
                    }
                }
            }
        }
    }
}

/// Print snapshots of one turn until it stops loading
pub fn spawn_turn_renderer(mut events: broadcast::Receiver<ChatEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut printer = DraftPrinter::default();
        loop {
            match events.recv().await {
                Ok(ChatEvent::Snapshot(messages)) => {
                    let draft = messages
                        .last()
                        .filter(|m| m.role == Role::Assistant && !m.is_persisted());
                    if let Some(draft) = draft {
                        printer.render(draft);
                    }
                }
                Ok(ChatEvent::Loading(false)) | Err(RecvError::Closed) => break,
                Ok(_) | Err(RecvError::Lagged(_)) => {}
            }
        }
    })
}

/// Summary line after a turn
pub fn print_outcome(outcome: &TurnOutcome) {
    match outcome.status {
        TurnStatus::Done => {
            println!();
            if let Some(reply) = outcome.reply() {
                if let Some(usage) = reply.usage {
                    println!(
                        "{}",
                        format!(
                            "[{} prompt + {} completion tokens, ${:.6}]",
                            usage.prompt_tokens,
                            usage.completion_tokens,
                            reply.cost.unwrap_or_default()
                        )
                        .dimmed()
                    );
                }
            }
        }
        TurnStatus::Failed => {
            println!();
            println!(
                "{}",
                format!(
                    "❌ {}",
                    outcome.error.as_deref().unwrap_or("Unknown error")
                )
                .red()
            );
        }
        TurnStatus::Ignored => {}
    }
    println!();
}

pub fn print_history(messages: &[Message], skin: &MadSkin) {
    if messages.is_empty() {
        println!("{}", "No messages yet.".dimmed());
        return;
    }

    for message in messages {
        let speaker = match message.role {
            Role::User => "You:".bright_cyan().bold(),
            Role::Assistant => "Assistant:".bright_green().bold(),
            Role::System => "System:".bright_magenta().bold(),
        };
        println!("{}", speaker);
        for step in message.reasoning.iter().filter(|s| s.status == StepStatus::Complete) {
            println!("{}", format!("🔍 {}", step.label).dimmed());
        }
        println!("{}", skin.term_text(&add_osc8_hyperlinks(&message.content)));
    }
}

pub fn print_threads(threads: &[ChatThread], current: &str) {
    if threads.is_empty() {
        println!("{}", "No threads.".dimmed());
        return;
    }

    for (i, thread) in threads.iter().enumerate() {
        let marker = if thread.id == current { "*" } else { " " };
        println!(
            "{} {}. {} {} {}",
            marker.bright_green(),
            (i + 1).to_string().bright_yellow(),
            thread.title.bright_white().bold(),
            format!("({})", thread.model_id).bright_blue(),
            format!("${:.4}", thread.total_cost).dimmed()
        );
    }
}

/// Models whose id or name contains `filter`, case-insensitively
pub fn filter_models<'a>(models: &'a [ModelDescriptor], filter: &str) -> Vec<&'a ModelDescriptor> {
    let needle = filter.to_lowercase();
    models
        .iter()
        .filter(|m| {
            needle.is_empty()
                || m.id.to_lowercase().contains(&needle)
                || m.name.to_lowercase().contains(&needle)
        })
        .collect()
}

pub fn print_models(models: &[&ModelDescriptor]) {
    for model in models {
        let tools = if model.supports_tools {
            "tools".bright_green()
        } else {
            "no tools".dimmed()
        };
        println!(
            "• {} ({}) {} {}",
            model.name.bright_green().bold(),
            model.id.bright_blue(),
            format!(
                "${:.2}/M in, ${:.2}/M out",
                model.pricing.prompt_rate, model.pricing.completion_rate
            )
            .dimmed(),
            tools
        );
    }
    println!("{}", format!("{} models", models.len()).dimmed());
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchat_common::ModelPricing;

    #[test]
    fn test_osc8_links() {
        let out = add_osc8_hyperlinks("see [docs](https://example.com) now");
        assert_eq!(
            out,
            "see \x1b]8;;https://example.com\x1b\\docs\x1b]8;;\x1b\\ now"
        );
        assert_eq!(add_osc8_hyperlinks("plain"), "plain");
    }

    #[test]
    fn test_filter_models() {
        let model = |id: &str, name: &str| ModelDescriptor {
            id: id.into(),
            name: name.into(),
            context_length: 0,
            pricing: ModelPricing::default(),
            supports_tools: true,
        };
        let models = vec![
            model("openai/gpt-4o-mini", "GPT-4o mini"),
            model("anthropic/claude-3.5-sonnet", "Claude 3.5 Sonnet"),
        ];

        assert_eq!(filter_models(&models, "").len(), 2);
        assert_eq!(filter_models(&models, "CLAUDE")[0].id, "anthropic/claude-3.5-sonnet");
        assert!(filter_models(&models, "llama").is_empty());
    }
}
