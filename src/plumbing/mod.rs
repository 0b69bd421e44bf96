mod main;
pub use main::main;

mod options;
