use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of pages in the Madani mushaf.
pub const TOTAL_PAGES: u16 = 604;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PageError {
    #[error("page {0} is outside 1..={TOTAL_PAGES}")]
    OutOfRange(i64),

    #[error("'{0}' is not a page number")]
    NotANumber(String),
}

/// A page of the corpus. Always within `1..=TOTAL_PAGES`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u16")]
pub struct PageNumber(u16);

impl PageNumber {
    pub const FIRST: PageNumber = PageNumber(1);
    pub const LAST: PageNumber = PageNumber(TOTAL_PAGES);

    pub fn new(page: i64) -> Result<Self, PageError> {
        if (1..=TOTAL_PAGES as i64).contains(&page) {
            Ok(Self(page as u16))
        } else {
            Err(PageError::OutOfRange(page))
        }
    }

    pub fn get(self) -> u16 {
        self.0
    }

    /// Every page of the corpus in ascending order.
    pub fn all() -> impl Iterator<Item = PageNumber> {
        (1..=TOTAL_PAGES).map(PageNumber)
    }
}

impl TryFrom<i64> for PageNumber {
    type Error = PageError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PageNumber> for u16 {
    fn from(page: PageNumber) -> Self {
        page.0
    }
}

impl FromStr for PageNumber {
    type Err = PageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: i64 = s
            .trim()
            .parse()
            .map_err(|_| PageError::NotANumber(s.to_string()))?;
        Self::new(value)
    }
}

impl fmt::Display for PageNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
