pub mod admin;
pub mod auth;
pub mod character_requests;
pub mod characters;
pub mod chat;
pub mod error;
pub mod gateway;
pub mod housing;
pub mod influence;
pub mod inventory;
pub mod journal;
pub mod middleware;
pub mod owl_post;
pub mod routes;
pub mod settings;
pub mod spells;
pub mod wands;
