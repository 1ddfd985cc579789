pub mod bounded;
pub mod fixed;

pub use bounded::BoundedPriorityQueue;
pub use fixed::{Comparator, FixedSizePq, Greater, Less};
