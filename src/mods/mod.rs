pub mod live;
pub mod offline;
pub mod report;
pub mod synth;
