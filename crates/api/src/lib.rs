//! HTTP surface of the notification service: trigger, report and
//! delivery-confirmation webhook endpoints.

pub mod middleware;
pub mod routes;
pub mod state;
