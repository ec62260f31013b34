pub mod auth;
pub mod committee;
pub mod family;
pub mod member;
pub mod post;
pub mod project;
pub mod subject;
