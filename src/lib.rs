pub mod command;
pub mod config;
pub mod dataset;
pub mod detector;
pub mod error;
pub mod frame;
pub mod image;
pub mod motion;
pub mod my_types;
pub mod optical_flow;
pub mod preprocess;
pub mod pyramid;
pub mod record;
pub mod synthetic;
pub mod tracker;
pub mod visualization;
