//! End-of-run checks and the printed leaderboard.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use northpole_presence::{ParticipantId, WorldSnapshot};

/// Compare the views of peers that are still in the room.
///
/// Every peer should see exactly the others, with the score each of them
/// holds locally. Returns one line per disagreement.
pub fn disagreements(views: &[WorldSnapshot]) -> Vec<String> {
    let everyone: BTreeSet<&ParticipantId> = views.iter().map(|v| &v.local.id).collect();
    let mut problems = Vec::new();

    for view in views {
        let me = &view.local.id;
        let seen: BTreeSet<&ParticipantId> = view.remotes.iter().map(|p| &p.id).collect();
        let expected: BTreeSet<&ParticipantId> =
            everyone.iter().copied().filter(|id| *id != me).collect();

        for missing in expected.difference(&seen) {
            problems.push(format!("{me} does not see {missing}"));
        }
        for ghost in seen.difference(&expected) {
            problems.push(format!("{me} still sees departed {ghost}"));
        }

        for other in views.iter().filter(|v| &v.local.id != me) {
            let Some(remote) = view.remote(&other.local.id) else {
                continue;
            };
            if remote.score != other.local.score {
                problems.push(format!(
                    "{me} has {} at {} points, they have {}",
                    other.local.id, remote.score, other.local.score
                ));
            }
        }
    }
    problems
}

/// Render a view's leaderboard as a text table.
pub fn leaderboard(view: &WorldSnapshot) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "  #  {:<12} {:>8}  position", "player", "score");
    for (rank, player) in view.leaderboard().iter().enumerate() {
        let marker = if player.is_local { "*" } else { " " };
        let _ = writeln!(
            out,
            "{marker}{:>2}  {} {:<10} {:>8}  ({:.0}, {:.0})",
            rank + 1,
            player.avatar_glyph,
            player.display_name,
            player.score,
            player.position.x,
            player.position.y
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use northpole_presence::{PlayerState, Vec2, Zone};
    use std::time::Instant;

    fn player(id: &str, score: u64, local: bool) -> PlayerState {
        let mut p = PlayerState::local(id.into(), format!("Elf-{id}"), "🧝", Vec2::new(1.0, 2.0), Instant::now());
        p.score = score;
        p.is_local = local;
        p
    }

    fn view(me: &str, score: u64, remotes: &[(&str, u64)]) -> WorldSnapshot {
        WorldSnapshot {
            local: player(me, score, true),
            remotes: remotes.iter().map(|(id, s)| player(id, *s, false)).collect(),
            chat: Vec::new(),
            zone: Zone::TownSquare,
            nearby: None,
            engaged: None,
        }
    }

    #[test]
    fn test_agreeing_views() {
        let views = vec![view("a", 10, &[("b", 20)]), view("b", 20, &[("a", 10)])];
        assert!(disagreements(&views).is_empty());
    }

    #[test]
    fn test_missing_ghost_and_stale_score() {
        let views = vec![
            view("a", 10, &[("b", 15), ("gone", 0)]),
            view("b", 20, &[]),
        ];
        let problems = disagreements(&views);
        assert_eq!(problems.len(), 3, "{problems:?}");
        assert!(problems.iter().any(|p| p.contains("does not see a")));
        assert!(problems.iter().any(|p| p.contains("departed gone")));
        assert!(problems.iter().any(|p| p.contains("15 points")));
    }

    #[test]
    fn test_leaderboard_marks_local() {
        let table = leaderboard(&view("a", 10, &[("b", 20)]));
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].contains("Elf-b"));
        assert!(lines[2].starts_with('*'));
    }
}
