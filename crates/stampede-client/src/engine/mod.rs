pub mod supervisor;
pub mod worker;
