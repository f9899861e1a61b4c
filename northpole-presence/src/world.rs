//! Local-only world data: zones, their interactables and hidden
//! collectibles.
//!
//! Nothing here is replicated. Each process discovers and marks hidden
//! items on its own, so two peers may disagree about which eggs are found.
//! Zone membership is local too; peers only see the resulting position.

use serde::{Deserialize, Serialize};

use crate::player::Vec2;

/// Radius within which walking onto a hidden item discovers it.
pub const DISCOVERY_RADIUS: f32 = 40.0;

/// Points awarded per discovered hidden item.
pub const HIDDEN_ITEM_POINTS: u64 = 10_000;

/// Distance avatars keep from the zone edge.
pub const EDGE_MARGIN: f32 = 20.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Zone {
    #[default]
    TownSquare,
    FrozenLake,
    MysticForest,
    SantaWorkshop,
}

impl Zone {
    pub fn name(&self) -> &'static str {
        match self {
            Zone::TownSquare => "North Pole Hall",
            Zone::FrozenLake => "Frozen Lake",
            Zone::MysticForest => "Mystic Forest",
            Zone::SantaWorkshop => "Workshop",
        }
    }

    /// (width, height) in world units.
    pub fn size(&self) -> (f32, f32) {
        match self {
            Zone::TownSquare => (2000.0, 2000.0),
            Zone::FrozenLake | Zone::MysticForest => (1500.0, 1500.0),
            Zone::SantaWorkshop => (1200.0, 1200.0),
        }
    }

    /// Fixed points of interest in this zone.
    pub fn interactables(&self) -> &'static [Interactable] {
        match self {
            Zone::TownSquare => TOWN_SQUARE_ITEMS,
            Zone::FrozenLake => FROZEN_LAKE_ITEMS,
            Zone::MysticForest => MYSTIC_FOREST_ITEMS,
            Zone::SantaWorkshop => WORKSHOP_ITEMS,
        }
    }

    /// Clamp a position into the walkable area of this zone.
    pub fn clamp(&self, pos: Vec2) -> Vec2 {
        let (w, h) = self.size();
        Vec2::new(
            pos.x.clamp(EDGE_MARGIN, w - EDGE_MARGIN),
            pos.y.clamp(EDGE_MARGIN, h - EDGE_MARGIN),
        )
    }
}

/// Mini-games offered by game interactables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MiniGame {
    Trivia,
    Clicker,
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractableKind {
    /// Opens a mini-game; winnings arrive later as awarded points.
    Game(MiniGame),
    /// A character with a fixed line.
    Npc { message: &'static str },
    /// Moves the local player into another zone.
    Portal { target: Zone },
}

/// A point of interest the local player can use when close enough.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interactable {
    pub id: &'static str,
    pub label: &'static str,
    pub icon: &'static str,
    pub position: Vec2,
    pub kind: InteractableKind,
    /// Use is possible strictly inside this distance.
    pub range: f32,
}

const fn portal(
    id: &'static str,
    label: &'static str,
    icon: &'static str,
    x: f32,
    y: f32,
    target: Zone,
) -> Interactable {
    Interactable {
        id,
        label,
        icon,
        position: Vec2::new(x, y),
        kind: InteractableKind::Portal { target },
        range: 100.0,
    }
}

const fn game(
    id: &'static str,
    label: &'static str,
    icon: &'static str,
    x: f32,
    y: f32,
    game: MiniGame,
) -> Interactable {
    Interactable {
        id,
        label,
        icon,
        position: Vec2::new(x, y),
        kind: InteractableKind::Game(game),
        range: 100.0,
    }
}

const TOWN_SQUARE_ITEMS: &[Interactable] = &[
    game("game_trivia_1", "Wise Owl Trivia", "🦉", 400.0, 400.0, MiniGame::Trivia),
    game("game_clicker_1", "Speedy Skater", "⛸️", 1200.0, 600.0, MiniGame::Clicker),
    Interactable {
        id: "npc_santa",
        label: "Santa",
        icon: "🎅",
        position: Vec2::new(1000.0, 150.0),
        kind: InteractableKind::Npc { message: "Ho Ho Ho! Find the hidden eggs!" },
        range: 120.0,
    },
    portal("portal_forest", "Mystic Forest", "🌲", 1800.0, 1000.0, Zone::MysticForest),
];

const FROZEN_LAKE_ITEMS: &[Interactable] = &[
    portal("portal_square", "Back to Hall", "🏠", 100.0, 750.0, Zone::TownSquare),
];

const MYSTIC_FOREST_ITEMS: &[Interactable] = &[
    portal("portal_square", "Back to Hall", "🏠", 100.0, 750.0, Zone::TownSquare),
    game("game_trivia_2", "Ancient Snowman", "☃️", 800.0, 500.0, MiniGame::Trivia),
];

const WORKSHOP_ITEMS: &[Interactable] = &[
    portal("portal_square", "Exit", "🚪", 600.0, 1100.0, Zone::TownSquare),
];

/// The closest interactable in `zone` whose range covers `pos`.
pub fn nearest_interactable(zone: Zone, pos: Vec2) -> Option<&'static Interactable> {
    nearest_in(zone.interactables(), pos)
}

fn nearest_in(items: &[Interactable], pos: Vec2) -> Option<&Interactable> {
    items
        .iter()
        .map(|item| (item, item.position.distance(&pos)))
        .filter(|(item, dist)| *dist < item.range)
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(item, _)| item)
}

#[derive(Debug, Clone, PartialEq)]
pub struct HiddenItem {
    pub id: &'static str,
    pub zone: Zone,
    pub position: Vec2,
    pub found: bool,
}

/// This process's view of the hidden eggs.
#[derive(Debug, Clone)]
pub struct HiddenItems {
    items: Vec<HiddenItem>,
}

impl HiddenItems {
    /// The standard egg layout.
    pub fn standard() -> Self {
        let egg = |id, zone, x, y| HiddenItem {
            id,
            zone,
            position: Vec2::new(x, y),
            found: false,
        };
        Self {
            items: vec![
                egg("egg_1", Zone::TownSquare, 250.0, 250.0),
                egg("egg_2", Zone::TownSquare, 1600.0, 1400.0),
                egg("egg_3", Zone::MysticForest, 500.0, 500.0),
            ],
        }
    }

    pub fn with_items(items: Vec<HiddenItem>) -> Self {
        Self { items }
    }

    /// Mark every unfound item in `zone` within reach of `pos` as found and
    /// return their ids.
    pub fn discover(&mut self, zone: Zone, pos: Vec2) -> Vec<&'static str> {
        self.items
            .iter_mut()
            .filter(|item| item.zone == zone && !item.found)
            .filter(|item| item.position.distance(&pos) < DISCOVERY_RADIUS)
            .map(|item| {
                item.found = true;
                item.id
            })
            .collect()
    }

    /// Unfound items in `zone`, for rendering.
    pub fn remaining_in(&self, zone: Zone) -> impl Iterator<Item = &HiddenItem> {
        self.items.iter().filter(move |i| i.zone == zone && !i.found)
    }

    pub fn found_count(&self) -> usize {
        self.items.iter().filter(|i| i.found).count()
    }
}

impl Default for HiddenItems {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zone_clamp_margin() {
        let zone = Zone::SantaWorkshop;
        assert_eq!(zone.clamp(Vec2::new(-50.0, 5000.0)), Vec2::new(20.0, 1180.0));
        assert_eq!(zone.clamp(Vec2::new(600.0, 600.0)), Vec2::new(600.0, 600.0));
    }

    #[test]
    fn test_nearest_interactable_range_is_strict() {
        let owl = Vec2::new(400.0, 400.0);
        let hit = nearest_interactable(Zone::TownSquare, Vec2::new(owl.x + 99.0, owl.y)).unwrap();
        assert_eq!(hit.id, "game_trivia_1");
        assert_eq!(hit.kind, InteractableKind::Game(MiniGame::Trivia));

        assert!(nearest_interactable(Zone::TownSquare, Vec2::new(owl.x + 100.0, owl.y)).is_none());
        assert!(nearest_interactable(Zone::TownSquare, Vec2::new(1000.0, 1000.0)).is_none());
    }

    #[test]
    fn test_nearest_interactable_uses_own_range() {
        // Santa reaches 120 units, further than the default 100.
        let santa = nearest_interactable(Zone::TownSquare, Vec2::new(1000.0, 265.0)).unwrap();
        assert!(matches!(santa.kind, InteractableKind::Npc { .. }));
    }

    #[test]
    fn test_nearest_interactable_picks_closest() {
        let items = [
            portal("far", "Far", "🚪", 0.0, 0.0, Zone::FrozenLake),
            portal("near", "Near", "🚪", 60.0, 0.0, Zone::SantaWorkshop),
        ];
        assert_eq!(nearest_in(&items, Vec2::new(40.0, 0.0)).unwrap().id, "near");
        assert_eq!(nearest_in(&items, Vec2::new(10.0, 0.0)).unwrap().id, "far");
    }

    #[test]
    fn test_every_zone_has_a_portal_home() {
        for zone in [Zone::FrozenLake, Zone::MysticForest, Zone::SantaWorkshop] {
            let home = zone
                .interactables()
                .iter()
                .any(|i| i.kind == InteractableKind::Portal { target: Zone::TownSquare });
            assert!(home, "{} has no way back", zone.name());
        }
    }

    #[test]
    fn test_discover_within_radius_once() {
        let mut items = HiddenItems::standard();
        assert_eq!(items.discover(Zone::TownSquare, Vec2::new(260.0, 260.0)), vec!["egg_1"]);
        assert!(items.discover(Zone::TownSquare, Vec2::new(250.0, 250.0)).is_empty());
        assert_eq!(items.found_count(), 1);
    }

    #[test]
    fn test_discover_respects_zone() {
        let mut items = HiddenItems::standard();
        // egg_3 sits at (500, 500) but only in the forest.
        assert!(items.discover(Zone::TownSquare, Vec2::new(500.0, 500.0)).is_empty());
        assert_eq!(items.discover(Zone::MysticForest, Vec2::new(500.0, 500.0)), vec!["egg_3"]);
    }

    #[test]
    fn test_discover_outside_radius() {
        let mut items = HiddenItems::standard();
        assert!(items.discover(Zone::TownSquare, Vec2::new(250.0, 290.0)).is_empty());
        assert_eq!(items.remaining_in(Zone::TownSquare).count(), 2);
    }
}
