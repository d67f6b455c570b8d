pub mod locate;
pub mod report;
