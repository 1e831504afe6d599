pub mod ledger;
pub mod projections;
