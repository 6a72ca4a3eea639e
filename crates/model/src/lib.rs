use std::fmt::Debug;

use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use utility::id::{HasId, Id};

pub mod weather;

pub trait ExampleData {
    fn example_data() -> Self;
}

/// An inclusive range of calendar dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DateRange {
    pub first: NaiveDate,
    pub last: NaiveDate,
}

impl DateRange {
    pub fn new(first: NaiveDate, last: NaiveDate) -> Self {
        Self { first, last }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.first <= date && date <= self.last
    }
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct WithId<V>
where
    V: HasId,
    V::IdType: Serialize + Debug + Clone,
{
    pub id: Id<V>,
    #[serde(flatten)]
    pub content: V,
}

impl<V> WithId<V>
where
    V: HasId,
    V::IdType: Serialize + Debug + Clone,
{
    pub fn new(id: Id<V>, content: V) -> Self {
        Self { id, content }
    }
}
