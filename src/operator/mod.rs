//! Operator-facing HTTP API — consumed by the dashboard.
//! Routes are merchant-scoped via the `Claims` the auth middleware
//! attaches to the request; an admin principal (is_admin) gets the
//! cross-tenant view.

mod pending_payments;
mod trusted_buyers;

use axum::{routing::get, Router};

use crate::store::Store;
use crate::verify::MatcherVerifier;

#[derive(Clone)]
pub struct OperatorState {
    pub store: Store,
    pub verifier: MatcherVerifier,
}

pub fn router(state: OperatorState) -> Router {
    Router::new()
    .route(
        "/api/pending-payments",
        get(pending_payments::list)
        .post(pending_payments::manual_match)
        .patch(pending_payments::discard)
        .delete(pending_payments::bulk_discard),
    )
    .route("/api/pending-payments/orders", get(pending_payments::candidate_orders))
    .route(
        "/api/trusted-buyers",
        get(trusted_buyers::list)
        .post(trusted_buyers::upsert)
        .patch(trusted_buyers::update)
        .delete(trusted_buyers::deactivate),
    )
    .with_state(state)
}
