/**
 * Record Routes
 * CRUD handlers shared by every record collection
 */

use std::sync::Arc;

use axum::{
    extract::{FromRef, Path, State},
    http::HeaderMap,
    routing::get,
    Router,
};

use super::Payload;
use crate::auth::SessionManager;
use crate::repository::{Entity, Repository};
use crate::response::ActionResponse;
use crate::state::AppState;

/// Mount list/create at `base` and get/update/delete at `base/{id}`.
pub fn routes<E: Entity>(router: Router<AppState>, base: &str) -> Router<AppState>
where
    Arc<Repository<E>>: FromRef<AppState>,
{
    router
        .route(base, get(list::<E>).post(create::<E>))
        .route(
            &format!("{base}/{{id}}"),
            get(find::<E>).patch(update::<E>).delete(remove::<E>),
        )
}

pub async fn list<E: Entity>(
    State(repo): State<Arc<Repository<E>>>,
    State(sessions): State<SessionManager>,
    headers: HeaderMap,
) -> ActionResponse<Vec<E>> {
    let caller = sessions.caller(&headers);
    repo.find_all(caller.as_ref()).await
}

pub async fn create<E: Entity>(
    State(repo): State<Arc<Repository<E>>>,
    State(sessions): State<SessionManager>,
    headers: HeaderMap,
    Payload(params): Payload,
) -> ActionResponse<E> {
    let caller = sessions.caller(&headers);
    repo.create(caller.as_ref(), params).await
}

pub async fn find<E: Entity>(
    State(repo): State<Arc<Repository<E>>>,
    State(sessions): State<SessionManager>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ActionResponse<E> {
    let caller = sessions.caller(&headers);
    repo.find_one(caller.as_ref(), &id).await
}

pub async fn update<E: Entity>(
    State(repo): State<Arc<Repository<E>>>,
    State(sessions): State<SessionManager>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Payload(params): Payload,
) -> ActionResponse<E> {
    let caller = sessions.caller(&headers);
    repo.update(caller.as_ref(), &id, params).await
}

pub async fn remove<E: Entity>(
    State(repo): State<Arc<Repository<E>>>,
    State(sessions): State<SessionManager>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ActionResponse<()> {
    let caller = sessions.caller(&headers);
    repo.delete(caller.as_ref(), &id).await
}
