//! DSI display panels.

pub mod dsi;
pub mod mipi;
pub mod script;
pub mod tianma_r63350;
