pub mod ecsv;
pub mod fits;
pub mod paths;
