//! Lookups of communities, collections and items.
//!
//! Every lookup is a GET and takes the caller's retry policy.

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::models::{
    Collection, CollectionScope, Community, DSpaceObject, DSpaceRecord, Item, RecordType,
};
use crate::network::{get_with_retry, RetryConfig};
use crate::session::Session;
use crate::{DsapsError, Result};

#[derive(Debug, Deserialize)]
struct UuidOnly {
    #[serde(default)]
    uuid: Option<String>,
}

/// Resolve a handle such as `1721.1/7830` to the object's UUID.
pub async fn get_uuid_from_handle<S>(
    session: &S,
    handle: &str,
    retry: &RetryConfig,
) -> Result<String>
where
    S: Session + ?Sized,
{
    let path = format!("handle/{}", handle.trim_matches('/'));
    let response = get_with_retry(session, &path, &[], retry)
        .await
        .map_err(|e| match e {
            DsapsError::Http { status: 404, .. } => DsapsError::NotFound {
                kind: "handle",
                id: handle.to_string(),
            },
            other => other,
        })?;

    // Unknown handles come back as 200 with a null body on some versions.
    if response.body.is_null() {
        return Err(DsapsError::NotFound {
            kind: "handle",
            id: handle.to_string(),
        });
    }

    let record: UuidOnly = response.json()?;
    let uuid = record.uuid.ok_or_else(|| DsapsError::UnexpectedResponse {
        endpoint: path,
        message: "record has no uuid".to_string(),
    })?;
    debug!("Handle {} is {}", handle, uuid);
    Ok(uuid)
}

/// Fetch one record with every child expanded.
pub async fn get_record<S>(
    session: &S,
    uuid: &str,
    record_type: RecordType,
    retry: &RetryConfig,
) -> Result<DSpaceRecord>
where
    S: Session + ?Sized,
{
    let path = format!("{}/{}", record_type.endpoint(), uuid);
    let query = [("expand".to_string(), "all".to_string())];
    let response = get_with_retry(session, &path, &query, retry)
        .await
        .map_err(|e| match e {
            DsapsError::Http { status: 404, .. } => DsapsError::NotFound {
                kind: record_type.endpoint(),
                id: uuid.to_string(),
            },
            other => other,
        })?;

    let record = match record_type {
        RecordType::Community => DSpaceRecord::Community(response.json::<Community>()?),
        RecordType::Collection => DSpaceRecord::Collection(response.json::<Collection>()?),
        RecordType::Item => DSpaceRecord::Item(response.json::<Item>()?),
    };
    Ok(record)
}

/// UUIDs of a community's direct child collections.
pub async fn community_collections<S>(
    session: &S,
    community_uuid: &str,
    retry: &RetryConfig,
) -> Result<Vec<String>>
where
    S: Session + ?Sized,
{
    let path = format!("communities/{}/collections", community_uuid);
    let children: Vec<UuidOnly> = get_with_retry(session, &path, &[], retry).await?.json()?;
    Ok(children.into_iter().filter_map(|c| c.uuid).collect())
}

/// Every top-level and sub-community visible to the session.
pub async fn list_communities<S>(session: &S, retry: &RetryConfig) -> Result<Vec<DSpaceObject>>
where
    S: Session + ?Sized,
{
    get_with_retry(session, "communities", &[], retry).await?.json()
}

/// Resolve a community handle to the collections a search should cover.
///
/// A community with no collections yields an unrestricted scope; callers
/// that must not fall back to a repository-wide search check for that.
pub async fn resolve_collection_scope<S>(
    session: &S,
    community_handle: &str,
    retry: &RetryConfig,
) -> Result<CollectionScope>
where
    S: Session + ?Sized,
{
    let community_uuid = get_uuid_from_handle(session, community_handle, retry).await?;
    let collections = community_collections(session, &community_uuid, retry).await?;
    info!(
        "Community {} ({}) has {} collections",
        community_handle,
        community_uuid,
        collections.len()
    );
    Ok(CollectionScope::new(collections))
}

/// `uuid` of a creation response body.
pub(crate) fn created_uuid(endpoint: &str, body: &Value) -> Result<String> {
    body.get("uuid")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| DsapsError::UnexpectedResponse {
            endpoint: endpoint.to_string(),
            message: "response has no uuid".to_string(),
        })
}
