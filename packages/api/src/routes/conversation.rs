use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{get, post},
};

use crate::{
    middleware::{RoleSet, require_roles},
    state::AppState,
};

pub mod history;
pub mod rag_query;
pub mod storing;

pub fn routes(state: &AppState) -> Router<AppState> {
    let optional_auth = Router::new()
        .route("/rag_query", post(rag_query::rag_query))
        .route_layer(from_fn_with_state(
            state.auth.guard(RoleSet::ANY),
            require_roles,
        ));

    let members = Router::new()
        .route("/storing", post(storing::store_conversation))
        .route("/list", get(history::list_conversations))
        .route("/{id}", get(history::get_conversation))
        .route_layer(from_fn_with_state(
            state.auth.guard(RoleSet::USER_OR_ADMIN),
            require_roles,
        ));

    Router::new().merge(optional_auth).merge(members)
}
