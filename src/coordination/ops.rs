//! Path helpers and idempotent compound operations on the tree.

use tracing::debug;
use tracing::info;

use super::CoordinationClient;
use super::CreateMode;
use crate::Error;
use crate::Result;

pub fn join_path(
    parent: &str,
    child: &str,
) -> String {
    if parent.ends_with('/') {
        format!("{parent}{child}")
    } else {
        format!("{parent}/{child}")
    }
}

/// `None` for the root
pub fn parent_path(path: &str) -> Option<&str> {
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

/// Last path segment
pub fn node_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

pub fn validate_path(path: &str) -> Result<()> {
    let valid = path == "/"
        || (path.starts_with('/') && !path.ends_with('/') && !path.contains("//"));
    if valid {
        Ok(())
    } else {
        Err(Error::Fatal(format!("invalid node path {path:?}")))
    }
}

/// Creates a persistent node unless it already exists.
///
/// Returns `true` when this call created the node.
pub async fn create_if_absent(
    client: &dyn CoordinationClient,
    path: &str,
    data: &[u8],
) -> Result<bool> {
    if client.exists(path, false).await?.is_some() {
        return Ok(false);
    }
    match client.create(path, data, CreateMode::Persistent).await {
        Ok(_) => Ok(true),
        Err(e) if e.is_node_exists() => Ok(false),
        Err(e) => Err(e),
    }
}

/// Creates `path` and every missing ancestor as empty persistent nodes.
pub async fn ensure_path(
    client: &dyn CoordinationClient,
    path: &str,
) -> Result<()> {
    validate_path(path)?;
    let mut current = String::new();
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        current.push('/');
        current.push_str(segment);
        create_if_absent(client, &current, &[]).await?;
    }
    Ok(())
}

/// Appends a sequential node under `prefix`'s parent and returns its path.
pub async fn create_sequential(
    client: &dyn CoordinationClient,
    prefix: &str,
    data: &[u8],
) -> Result<String> {
    client.create(prefix, data, CreateMode::PersistentSequential).await
}

/// Creates an ephemeral node owned by this session.
///
/// A node left behind by a session the service has not yet expired is given
/// one session timeout to disappear. A node already owned by this session is
/// adopted; its data is written only when it differs from `data`. Returns
/// `false` when the path is still held by another live session.
pub async fn create_ephemeral_replacing_stale(
    client: &dyn CoordinationClient,
    path: &str,
    data: &[u8],
) -> Result<bool> {
    if let Some(stat) = client.exists(path, false).await? {
        if stat.ephemeral_owner == client.session_id() {
            let (current, _) = client.get_data(path, false).await?;
            if current != data {
                client.set_data(path, data, None).await?;
            }
            return Ok(true);
        }
        info!(
            "{path} held by session {}, waiting one session timeout",
            stat.ephemeral_owner
        );
        tokio::time::sleep(client.session_timeout()).await;
        if client.exists(path, false).await?.is_some() {
            return Ok(false);
        }
    }
    match client.create(path, data, CreateMode::Ephemeral).await {
        Ok(_) => Ok(true),
        Err(e) if e.is_node_exists() => Ok(false),
        Err(e) => Err(e),
    }
}

/// Deletes `path` and its whole subtree. A missing node is not an error.
pub async fn delete_recursively(
    client: &dyn CoordinationClient,
    path: &str,
) -> Result<()> {
    let mut order = Vec::new();
    let mut stack = vec![path.to_string()];
    while let Some(current) = stack.pop() {
        match client.get_children(&current, false).await {
            Ok(children) => {
                stack.extend(children.iter().map(|c| join_path(&current, c)));
                order.push(current);
            }
            Err(e) if e.is_no_node() => continue,
            Err(e) => return Err(e),
        }
    }
    // children were pushed after their parent
    for node in order.iter().rev() {
        match client.delete(node, None).await {
            Ok(()) => debug!("deleted {node}"),
            Err(e) if e.is_no_node() => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Deletes every child subtree of `path` except children named in `skip`.
pub async fn delete_children_recursively(
    client: &dyn CoordinationClient,
    path: &str,
    skip: &[&str],
) -> Result<()> {
    let children = match client.get_children(path, false).await {
        Ok(children) => children,
        Err(e) if e.is_no_node() => return Ok(()),
        Err(e) => return Err(e),
    };
    for child in children.iter().filter(|c| !skip.contains(&c.as_str())) {
        delete_recursively(client, &join_path(path, child)).await?;
    }
    Ok(())
}
