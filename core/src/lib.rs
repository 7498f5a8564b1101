pub mod carbs;
pub mod catalog;
pub mod classify;
pub mod db;
pub mod error;
pub mod glucose_import;
pub mod models;
pub mod planner;
pub mod recommend;
pub mod service;
pub mod targets;
pub mod trend;
