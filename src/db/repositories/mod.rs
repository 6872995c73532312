pub mod buckets;

pub use buckets::StoredState;
