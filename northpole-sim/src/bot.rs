//! Scripted bot players.
//!
//! Each bot owns one presence session and feeds it input the way a
//! keyboard would: one direction sample per frame, plus the occasional
//! chat line and mini-game win.

use std::time::Duration;

use northpole_presence::{
    InputDirection, LocalCommand, MeshHub, ParticipantId, PresenceConfig, PresenceSession,
    SessionError, WorldSnapshot,
};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// ~60 Hz input sampling.
pub const FRAME: Duration = Duration::from_millis(16);

const NAMES: [&str; 8] = [
    "Jingle", "Tinsel", "Sprout", "Pudding", "Snowdrop", "Ginger", "Holly", "Nutmeg",
];
const GLYPHS: [&str; 4] = ["🧝", "⛄", "🦌", "🎅"];
const GREETINGS: [&str; 3] = ["Merry Christmas!", "Anyone seen the eggs?", "Ho ho ho"];

pub struct Bot {
    pub index: usize,
    pub id: ParticipantId,
    pub name: String,
    commands: mpsc::Sender<LocalCommand>,
    view: watch::Receiver<WorldSnapshot>,
    session: JoinHandle<WorldSnapshot>,
}

impl Bot {
    /// Join the mesh and start the session loop.
    pub fn spawn(hub: &MeshHub, base: &PresenceConfig, index: usize) -> Result<Self, SessionError> {
        let name = format!("{}{}", NAMES[index % NAMES.len()], index / NAMES.len() + 1);
        let config = PresenceConfig {
            display_name: name.clone(),
            avatar_glyph: GLYPHS[index % GLYPHS.len()].to_string(),
            spawn_x: base.spawn_x + 40.0 * index as f32,
            ..base.clone()
        };

        let (session, events) = PresenceSession::join(hub, config)?;
        let id = session.local_id().clone();
        let view = session.subscribe();
        let (commands, rx) = mpsc::channel(256);
        let session = tokio::spawn(session.run(events, rx));

        Ok(Self { index, id, name, commands, view, session })
    }

    pub fn view(&self) -> WorldSnapshot {
        self.view.borrow().clone()
    }

    /// Start feeding scripted input for `frames` frames.
    pub fn drive(&self, frames: u64) -> JoinHandle<()> {
        let commands = self.commands.clone();
        let index = self.index;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(FRAME);
            for frame in 0..frames {
                ticker.tick().await;
                for command in script(index, frame) {
                    if commands.send(command).await.is_err() {
                        return;
                    }
                }
            }
        })
    }

    /// Stop the session and return its final view.
    pub async fn leave(self) -> Option<WorldSnapshot> {
        let _ = self.commands.send(LocalCommand::Shutdown).await;
        match self.session.await {
            Ok(view) => Some(view),
            Err(e) => {
                log::error!("Session of {} ended abnormally: {e}", self.name);
                None
            }
        }
    }
}

/// Commands a bot issues on a given frame.
fn script(index: usize, frame: u64) -> Vec<LocalCommand> {
    let mut out = Vec::with_capacity(2);

    // Walk a square whose phase depends on the bot.
    let leg = (frame / 45 + index as u64) % 4;
    let direction = match leg {
        0 => InputDirection::new(false, false, false, true),
        1 => InputDirection::new(false, true, false, false),
        2 => InputDirection::new(false, false, true, false),
        _ => InputDirection::new(true, false, false, false),
    };
    out.push(LocalCommand::Input(direction));

    let offset = index as u64 * 17;
    if (frame + offset) % 150 == 0 {
        out.push(LocalCommand::Say(GREETINGS[(frame / 150) as usize % GREETINGS.len()].to_string()));
    }
    if (frame + offset) % 97 == 0 {
        out.push(LocalCommand::AwardPoints(10 * (index as u64 + 1)));
    }
    out
}
