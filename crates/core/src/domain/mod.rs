pub mod change;
pub mod company;
pub mod report;
pub mod snapshot;
pub mod subscriber;
