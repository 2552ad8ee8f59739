//! HTTP route handlers

pub mod auth;
pub mod campaigns;
pub mod customers;
pub mod health;
pub mod orders;
pub mod segments;
