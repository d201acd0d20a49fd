use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Aggregate counts for one migration run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunCounters {
    processed: u64,
    upserts: BTreeMap<String, u64>,
    tallies: BTreeMap<String, u64>,
}

impl RunCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_processed(&mut self) {
        self.processed += 1;
    }

    pub fn add_processed(&mut self, amount: u64) {
        self.processed += amount;
    }

    pub fn record_upsert(&mut self, collection: &str) {
        *self.upserts.entry(collection.to_string()).or_default() += 1;
    }

    /// Increments a named counter such as `skipped` or `missing_payload`.
    pub fn bump(&mut self, name: &str) {
        self.add(name, 1);
    }

    pub fn add(&mut self, name: &str, amount: u64) {
        *self.tallies.entry(name.to_string()).or_default() += amount;
    }

    pub fn processed(&self) -> u64 {
        self.processed
    }

    pub fn upserts(&self, collection: &str) -> u64 {
        self.upserts.get(collection).copied().unwrap_or(0)
    }

    pub fn tally(&self, name: &str) -> u64 {
        self.tallies.get(name).copied().unwrap_or(0)
    }

    pub fn total_upserts(&self) -> u64 {
        self.upserts.values().sum()
    }

    pub fn upsert_counts(&self) -> &BTreeMap<String, u64> {
        &self.upserts
    }

    pub fn tallies(&self) -> &BTreeMap<String, u64> {
        &self.tallies
    }
}

impl fmt::Display for RunCounters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Total processed: {}", self.processed)?;
        for (collection, count) in &self.upserts {
            write!(f, ", {} upserts: {}", collection, count)?;
        }
        for (name, count) in &self.tallies {
            write!(f, ", {}: {}", name, count)?;
        }
        Ok(())
    }
}
