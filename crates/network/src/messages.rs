//! Message catalogue
//!
//! Every message is a closed, internally tagged enum. Adding an operation is
//! a compile-time change that every `match` in the workspace has to handle.

use bigfs_types::{Fault, FileEntry, NodeId, NodeRecord};
use serde::{Deserialize, Serialize};

/// Command envelope sent by a client to a node. One per connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum Command {
    List {
        path: String,
    },
    Create {
        path: String,
        #[serde(default)]
        is_dir: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
    },
    Read {
        path: String,
    },
    Copy {
        path: String,
        new_path: String,
    },
    Remove {
        path: String,
    },
    /// Download; the node answers with the transfer handshake.
    Fetch {
        path: String,
    },
    /// Upload; the client follows up with the transfer handshake.
    Push {
        file_name: String,
    },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::List { .. } => "list",
            Command::Create { .. } => "create",
            Command::Read { .. } => "read",
            Command::Copy { .. } => "copy",
            Command::Remove { .. } => "remove",
            Command::Fetch { .. } => "fetch",
            Command::Push { .. } => "push",
        }
    }

    /// Primary client-supplied path of the command.
    pub fn path(&self) -> &str {
        match self {
            Command::List { path }
            | Command::Create { path, .. }
            | Command::Read { path }
            | Command::Copy { path, .. }
            | Command::Remove { path }
            | Command::Fetch { path } => path,
            Command::Push { file_name } => file_name,
        }
    }
}

/// Final answer of a node to a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Reply {
    Ok,
    Entries {
        files: Vec<FileEntry>,
    },
    Content {
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
    },
    Error {
        fault: Fault,
    },
}

impl Reply {
    pub fn error(fault: Fault) -> Self {
        Reply::Error { fault }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Reply::Ok => "ok",
            Reply::Entries { .. } => "entries",
            Reply::Content { .. } => "content",
            Reply::Error { .. } => "error",
        }
    }

    /// Split a reply into success and the carried fault.
    pub fn into_result(self) -> Result<Reply, Fault> {
        match self {
            Reply::Error { fault } => Err(fault),
            other => Ok(other),
        }
    }
}

/// Control frames of the transfer handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "handshake", rename_all = "snake_case")]
pub enum Handshake {
    /// Sender announces the exact payload length.
    Declare { size: u64 },
    /// Receiver accepts; raw payload bytes follow.
    Ack,
    /// Either side refuses the transfer before any payload byte moves.
    Abort { fault: Fault },
}

/// Request sent to the directory. Several may share one connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum DirectoryRequest {
    Register { host: String },
    Heartbeat { node_id: NodeId },
    ListNodes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DirectoryReply {
    Registered { node_id: NodeId, port: u16 },
    Ack,
    Nodes { nodes: Vec<NodeRecord> },
    Error { fault: Fault },
}

impl DirectoryReply {
    pub fn kind(&self) -> &'static str {
        match self {
            DirectoryReply::Registered { .. } => "registered",
            DirectoryReply::Ack => "ack",
            DirectoryReply::Nodes { .. } => "nodes",
            DirectoryReply::Error { .. } => "error",
        }
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigfs_types::FaultKind;
    use serde_json::json;

    #[test]
    fn test_command_wire_shape() {
        let command = Command::Copy {
            path: "/a.txt".into(),
            new_path: "/b.txt".into(),
        };
        let value = serde_json::to_value(&command).unwrap();
        assert_eq!(
            value,
            json!({"operation": "copy", "path": "/a.txt", "new_path": "/b.txt"})
        );
    }

    #[test]
    fn test_create_defaults() {
        let command: Command =
            serde_json::from_value(json!({"operation": "create", "path": "/d"})).unwrap();
        assert_eq!(
            command,
            Command::Create {
                path: "/d".into(),
                is_dir: false,
                content: None
            }
        );
    }

    #[test]
    fn test_missing_argument_fails_decode() {
        let result: Result<Command, _> =
            serde_json::from_value(json!({"operation": "copy", "path": "/a"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_content_is_base64() {
        let reply = Reply::Content {
            data: vec![0, 159, 146, 150],
        };
        let value = serde_json::to_value(&reply).unwrap();
        assert_eq!(value, json!({"status": "content", "data": "AJ+Slg=="}));

        let back: Reply = serde_json::from_value(value).unwrap();
        assert_eq!(back, reply);
    }

    #[test]
    fn test_reply_into_result() {
        let fault = Fault::new(FaultKind::NotFound, "missing");
        assert_eq!(Reply::error(fault.clone()).into_result(), Err(fault));
        assert_eq!(Reply::Ok.into_result(), Ok(Reply::Ok));
    }

    #[test]
    fn test_command_accessors() {
        let push = Command::Push {
            file_name: "up.bin".into(),
        };
        assert_eq!(push.name(), "push");
        assert_eq!(push.path(), "up.bin");
    }
}
