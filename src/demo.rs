//! Built-in sample scenes for the command line runner and tests.
//!
//! Each scene shows one behaviour of the placement engine, from a plain pile of
//! overlapping parts to a busy board with several classes and clusters.

use crate::types::*;

/// Kinds of built-in scenes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemoKind {
    /// Six resistors dropped on the same spot
    OverlappingPile,
    /// Seven resistors, enough for two sub-groups
    ResistorBank,
    /// Resistors, capacitors and inductors spread over the board
    MixedBoard,
    /// Two far apart chains of capacitors
    ScatteredClusters,
}

/// Metadata for a single demo scene.
pub struct DemoInfo {
    /// Stable identifier for the scene
    pub kind: DemoKind,
    /// Name accepted on the command line
    pub name: &'static str,
}

/// Returns all demo scenes with their names.
pub const fn all_demos() -> &'static [DemoInfo] {
    const DEMOS: &[DemoInfo] = &[
        DemoInfo {
            kind: DemoKind::OverlappingPile,
            name: "pile",
        },
        DemoInfo {
            kind: DemoKind::ResistorBank,
            name: "bank",
        },
        DemoInfo {
            kind: DemoKind::MixedBoard,
            name: "board",
        },
        DemoInfo {
            kind: DemoKind::ScatteredClusters,
            name: "clusters",
        },
    ];
    DEMOS
}

/// Looks a demo up by its command line name.
pub fn find_demo(name: &str) -> Option<DemoKind> {
    all_demos()
        .iter()
        .find(|demo| demo.name.eq_ignore_ascii_case(name))
        .map(|demo| demo.kind)
}

/// Builds the scene for the given demo kind.
pub fn build_demo(kind: DemoKind) -> Scene {
    match kind {
        DemoKind::OverlappingPile => build_pile(),
        DemoKind::ResistorBank => build_bank(),
        DemoKind::MixedBoard => build_board(),
        DemoKind::ScatteredClusters => build_clusters(),
    }
}

fn build_pile() -> Scene {
    let mut scene = Scene::new();
    for _ in 0..6 {
        scene.place("R", Point::ZERO, Some(Extent::sized(1.0, 1.0)));
    }
    scene
}

fn build_bank() -> Scene {
    let mut scene = Scene::new();
    // Dropped in reverse so the layout has to restore numbering order
    for n in (1..=7).rev() {
        scene.add_item(Item::sized(
            &format!("R{n}"),
            Point::new(n as f32 * 1.5, (n % 3) as f32),
            1.0,
            1.0,
        ));
    }
    scene
}

fn build_board() -> Scene {
    let mut scene = Scene::new();
    let parts = [
        ("R", Point::new(0.0, 0.0), 1.0, 0.5),
        ("C", Point::new(0.3, 0.2), 0.6, 1.0),
        ("R", Point::new(4.0, 2.0), 1.0, 0.5),
        ("L", Point::new(4.2, 2.1), 1.2, 1.2),
        ("C", Point::new(-3.0, 5.0), 0.6, 1.0),
        ("R", Point::new(-2.5, 5.0), 1.0, 0.5),
        ("D", Point::new(8.0, -1.0), 0.8, 0.8),
    ];
    for (tag, position, width, height) in parts {
        scene.place(tag, position, Some(Extent::sized(width, height)));
    }

    // Pins never collide
    let pin = scene.place("P", Point::new(0.0, 0.0), Some(Extent::sized(0.2, 0.2)));
    if let Some(item) = scene.get_mut(&pin) {
        item.category = ItemCategory::Decoration;
    }

    // Dropped without a renderable body
    scene.place("L", Point::new(10.0, 10.0), None);
    scene
}

fn build_clusters() -> Scene {
    let mut scene = Scene::new();
    for i in 0..4 {
        scene.place("C", Point::new(i as f32 * 2.0, 0.0), Some(Extent::sized(0.6, 1.0)));
    }
    for i in 0..3 {
        scene.place(
            "C",
            Point::new(50.0 + i as f32 * 2.5, 20.0),
            Some(Extent::sized(0.6, 1.0)),
        );
    }
    scene
}
