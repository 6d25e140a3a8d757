use crate::page::PageNumber;
use crate::progress::ProgressStore;
use anyhow::Result;
use log::debug;
use rand::Rng;
use rand::seq::SliceRandom;

/// Result of asking for the next page to revise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    Page(PageNumber),
    /// Every page has been revised.
    Exhausted,
}

/// Picks an unrevised page uniformly at random. Selecting does not mark
/// anything; a page stays eligible until its render completes.
pub struct PageSelector<'a> {
    store: &'a dyn ProgressStore,
}

impl<'a> PageSelector<'a> {
    pub fn new(store: &'a dyn ProgressStore) -> Self {
        Self { store }
    }

    pub fn select(&self) -> Result<Selection> {
        self.select_with(&mut rand::thread_rng())
    }

    pub fn select_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Selection> {
        let progress = self.store.load()?;
        let unrevised = progress.unrevised();
        debug!(
            "{} revised, {} candidates remaining",
            progress.len(),
            unrevised.len()
        );
        Ok(match unrevised.choose(rng) {
            Some(page) => Selection::Page(*page),
            None => Selection::Exhausted,
        })
    }
}
