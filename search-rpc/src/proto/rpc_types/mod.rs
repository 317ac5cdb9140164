pub mod __rt;
pub mod controller;
pub mod descriptor;
pub mod error;
pub mod handler;
pub mod service;
