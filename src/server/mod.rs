//! HTTP surface: the upload form, the match endpoint and the static result files

pub mod app;
pub mod pages;
pub mod response;
