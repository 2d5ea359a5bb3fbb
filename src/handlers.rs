//! HTTP handlers bound to the `/api` surface (C12).

pub mod object_handlers;
