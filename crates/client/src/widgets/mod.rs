pub mod activity_log;
pub mod command_bar;
pub mod flow;
pub mod graph;
pub mod results;
