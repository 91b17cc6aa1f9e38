//! `SeaORM` entities for the gateway's Postgres schema.

pub mod prelude;

pub mod account;
pub mod admin;
pub mod conversation;
pub mod device;
pub mod device_conversation;
pub mod pdf;
pub mod pdf_image;
pub mod pdf_page;
pub mod pdf_paragraph;
pub mod request_response_pair;
pub mod request_response_pair_pdf_image;
pub mod role;
pub mod temp_user;
pub mod user;
