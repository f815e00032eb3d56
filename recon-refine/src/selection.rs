//! Main/side camera pairings chosen for one refinement pass.

use std::collections::{BTreeMap, BTreeSet};

/// Main frame index to the distinct side frames paired with it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionMap {
    pairs: BTreeMap<usize, BTreeSet<usize>>,
}

impl SelectionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.pairs.clear();
    }

    /// Record a pairing. Returns `false` when it was already present or
    /// pairs a frame with itself.
    pub fn insert(&mut self, main: usize, side: usize) -> bool {
        if main == side {
            return false;
        }
        self.pairs.entry(main).or_default().insert(side)
    }

    pub fn is_main(&self, frame: usize) -> bool {
        self.pairs.contains_key(&frame)
    }

    pub fn has_side(&self, main: usize, side: usize) -> bool {
        self.pairs.get(&main).is_some_and(|sides| sides.contains(&side))
    }

    pub fn sides(&self, main: usize) -> Option<&BTreeSet<usize>> {
        self.pairs.get(&main)
    }

    /// Main frames in ascending order.
    pub fn mains(&self) -> impl Iterator<Item = usize> + '_ {
        self.pairs.keys().copied()
    }

    /// Every `(main, side)` pair, mains ascending, sides ascending within.
    pub fn pairs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.pairs
            .iter()
            .flat_map(|(&main, sides)| sides.iter().map(move |&side| (main, side)))
    }

    pub fn main_count(&self) -> usize {
        self.pairs.len()
    }

    pub fn pair_count(&self) -> usize {
        self.pairs.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn cursor(&self) -> SelectionCursor {
        SelectionCursor::new(self)
    }
}

/// Two-level cursor over a snapshot of a [`SelectionMap`].
///
/// Side traversal is only valid for the main frame the cursor currently
/// sits on; asking for the sides of any other frame yields `None`.
#[derive(Debug, Clone)]
pub struct SelectionCursor {
    entries: Vec<(usize, Vec<usize>)>,
    main: Option<usize>,
    side: usize,
}

impl SelectionCursor {
    pub fn new(map: &SelectionMap) -> Self {
        Self {
            entries: map
                .pairs
                .iter()
                .map(|(&main, sides)| (main, sides.iter().copied().collect()))
                .collect(),
            main: None,
            side: 0,
        }
    }

    pub fn begin_main(&mut self) -> Option<usize> {
        self.main = Some(0);
        self.current_main()
    }

    pub fn next_main(&mut self) -> Option<usize> {
        let next = self.main?.saturating_add(1);
        self.main = Some(next);
        self.current_main()
    }

    pub fn begin_side(&mut self, main: usize) -> Option<usize> {
        let sides = self.sides_of(main)?;
        let first = sides.first().copied();
        self.side = 0;
        first
    }

    pub fn next_side(&mut self, main: usize) -> Option<usize> {
        let next = self.side + 1;
        let side = self.sides_of(main)?.get(next).copied();
        self.side = next;
        side
    }

    fn current_main(&self) -> Option<usize> {
        self.entries.get(self.main?).map(|(main, _)| *main)
    }

    fn sides_of(&self, main: usize) -> Option<&[usize]> {
        match self.entries.get(self.main?) {
            Some((current, sides)) if *current == main => Some(sides),
            _ => None,
        }
    }
}
