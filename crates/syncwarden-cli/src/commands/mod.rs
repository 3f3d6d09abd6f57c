pub mod clear_history;
pub mod remote;
pub mod serve;
pub mod status;
