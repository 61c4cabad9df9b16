//! Conversation session management.

use clap::{Args, Subcommand};
use lexrag_core::{config::AppConfig, AppResult};
use lexrag_knowledge::Pipeline;

/// Manage conversation sessions
#[derive(Args, Debug)]
pub struct SessionCommand {
    #[command(subcommand)]
    pub action: SessionAction,
}

#[derive(Subcommand, Debug)]
pub enum SessionAction {
    /// List sessions, or the turns of one session
    List {
        /// Session id whose turns to show
        id: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Forget the history of a session
    Reset {
        /// Session id
        id: String,
    },
}

impl SessionCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let pipeline = Pipeline::open(config)?;

        match &self.action {
            SessionAction::List { id: Some(id), json } => {
                let turns = pipeline.session_turns(id)?;
                if *json {
                    println!("{}", serde_json::to_string_pretty(&turns)?);
                } else if turns.is_empty() {
                    println!("No turns stored for session '{}'", id);
                } else {
                    for turn in turns {
                        println!(
                            "[{}] {}: {}",
                            turn.created_at.to_rfc3339(),
                            turn.role.as_str(),
                            turn.content
                        );
                    }
                }
            }
            SessionAction::List { id: None, json } => {
                let sessions = pipeline.sessions()?;
                if *json {
                    println!("{}", serde_json::to_string_pretty(&sessions)?);
                } else if sessions.is_empty() {
                    println!("No sessions");
                } else {
                    for session in sessions {
                        println!(
                            "{}  {} turns, last active {}",
                            session.id,
                            session.turns,
                            session.last_active.to_rfc3339()
                        );
                    }
                }
            }
            SessionAction::Reset { id } => {
                let removed = pipeline.reset_session(id)?;
                println!("Session '{}' reset ({} turns removed)", id, removed);
            }
        }

        Ok(())
    }
}
