// Workspace URLs and the `.bufsync` session marker at the project root.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use serde_json::{Map, Value};
use url::Url;

/// Marker file written at the project root when a session starts.
pub const MARKER_FILE: &str = ".bufsync";

pub const DEFAULT_SECURE_PORT: u16 = 3448;
pub const DEFAULT_PLAIN_PORT: u16 = 3148;

/// Address of a shared workspace on a sync server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceUrl {
    pub host: String,
    pub owner: String,
    pub port: u16,
    pub workspace: String,
    pub secure: bool,
}

impl WorkspaceUrl {
    pub fn parse(input: &str) -> Result<Self> {
        let url = Url::parse(input).with_context(|| format!("invalid workspace url `{input}`"))?;
        let secure = match url.scheme() {
            "https" => true,
            "http" => false,
            other => bail!("unsupported workspace url scheme `{other}`"),
        };
        let host = url.host_str().ok_or_else(|| anyhow!("workspace url `{input}` has no host"))?;
        let default_port = if secure { DEFAULT_SECURE_PORT } else { DEFAULT_PLAIN_PORT };
        let port = url.port().unwrap_or(default_port);

        let segments: Vec<&str> = url
            .path_segments()
            .map(|segments| segments.filter(|segment| !segment.is_empty()).collect())
            .unwrap_or_default();
        let [owner, workspace] = segments.as_slice() else {
            bail!("workspace url `{input}` must look like https://host/owner/workspace");
        };

        Ok(Self {
            host: host.to_owned(),
            owner: (*owner).to_owned(),
            port,
            workspace: (*workspace).to_owned(),
            secure,
        })
    }

    fn default_port(&self) -> u16 {
        if self.secure {
            DEFAULT_SECURE_PORT
        } else {
            DEFAULT_PLAIN_PORT
        }
    }
}

impl fmt::Display for WorkspaceUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = if self.secure { "https" } else { "http" };
        write!(f, "{scheme}://{}", self.host)?;
        if self.port != self.default_port() {
            write!(f, ":{}", self.port)?;
        }
        write!(f, "/{}/{}", self.owner, self.workspace)
    }
}

pub fn marker_path(root: &Path) -> PathBuf {
    root.join(MARKER_FILE)
}

/// Record the workspace url in the marker, keeping any other keys.
pub fn write_marker(root: &Path, url: &WorkspaceUrl) -> Result<()> {
    let path = marker_path(root);
    let mut object = match std::fs::read_to_string(&path) {
        Ok(contents) => match serde_json::from_str::<Value>(&contents) {
            Ok(Value::Object(object)) => object,
            _ => Map::new(),
        },
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Map::new(),
        Err(error) => {
            return Err(error).with_context(|| format!("failed to read `{}`", path.display()));
        }
    };
    object.insert("url".into(), Value::String(url.to_string()));

    let mut contents = serde_json::to_string_pretty(&Value::Object(object))
        .context("failed to serialize session marker")?;
    contents.push('\n');
    std::fs::write(&path, contents).with_context(|| format!("failed to write `{}`", path.display()))
}

/// Read the workspace url back from the marker, if one was recorded.
pub fn read_marker(root: &Path) -> Result<Option<WorkspaceUrl>> {
    let path = marker_path(root);
    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(error) => {
            return Err(error).with_context(|| format!("failed to read `{}`", path.display()));
        }
    };
    let value: Value = serde_json::from_str(&contents)
        .with_context(|| format!("`{}` is not valid JSON", path.display()))?;
    match value.get("url").and_then(Value::as_str) {
        Some(url) => WorkspaceUrl::parse(url).map(Some),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample(secure: bool, port: u16) -> WorkspaceUrl {
        WorkspaceUrl {
            host: "sync.example.com".into(),
            owner: "alice".into(),
            port,
            workspace: "notes".into(),
            secure,
        }
    }

    #[test]
    fn default_ports_are_omitted() {
        assert_eq!(sample(true, 3448).to_string(), "https://sync.example.com/alice/notes");
        assert_eq!(sample(false, 3148).to_string(), "http://sync.example.com/alice/notes");
        assert_eq!(sample(true, 8443).to_string(), "https://sync.example.com:8443/alice/notes");
    }

    #[test]
    fn parse_fills_default_ports() {
        assert_eq!(
            WorkspaceUrl::parse("https://sync.example.com/alice/notes").unwrap(),
            sample(true, 3448)
        );
        assert_eq!(
            WorkspaceUrl::parse("http://sync.example.com/alice/notes/").unwrap(),
            sample(false, 3148)
        );
        assert_eq!(
            WorkspaceUrl::parse("https://sync.example.com:8443/alice/notes").unwrap(),
            sample(true, 8443)
        );
    }

    #[test]
    fn parse_rejects_bad_urls() {
        assert!(WorkspaceUrl::parse("ftp://sync.example.com/alice/notes").is_err());
        assert!(WorkspaceUrl::parse("https://sync.example.com/alice").is_err());
        assert!(WorkspaceUrl::parse("https://sync.example.com/a/b/c").is_err());
        assert!(WorkspaceUrl::parse("not a url").is_err());
    }

    #[test]
    fn marker_merges_existing_keys() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(marker_path(tmp.path()), r#"{"url":"old","editor":"vim"}"#).unwrap();

        write_marker(tmp.path(), &sample(true, 3448)).unwrap();

        let value: Value =
            serde_json::from_str(&std::fs::read_to_string(marker_path(tmp.path())).unwrap())
                .unwrap();
        assert_eq!(value["url"], "https://sync.example.com/alice/notes");
        assert_eq!(value["editor"], "vim");
        assert_eq!(read_marker(tmp.path()).unwrap(), Some(sample(true, 3448)));
    }

    #[test]
    fn marker_replaces_garbage() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(marker_path(tmp.path()), "not json").unwrap();
        write_marker(tmp.path(), &sample(false, 9000)).unwrap();
        assert_eq!(read_marker(tmp.path()).unwrap(), Some(sample(false, 9000)));
    }

    #[test]
    fn missing_marker_reads_as_none() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(read_marker(tmp.path()).unwrap(), None);
    }
}
