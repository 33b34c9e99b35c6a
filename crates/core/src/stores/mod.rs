pub mod rest_index;

pub use rest_index::RestSearchIndex;
