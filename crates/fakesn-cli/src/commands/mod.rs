pub mod config;
pub mod detect;
pub mod efficiency;
pub mod epsf;
pub mod info;
pub mod plant;
pub mod run;
pub mod stamps;
pub mod stars;
