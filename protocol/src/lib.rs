//! Wire contract between the editor-side bridge and the analyzer daemon.
//!
//! Messages are hand-written prost structs rather than generated code: the
//! field tags below *are* the protocol. Renumbering a tag or changing a
//! field's type is a wire-format break that requires a matching daemon
//! release — it must never happen as a side effect of refactoring.

pub mod codec;

pub use codec::{FrameError, FrameReader, FrameWriter, MAX_FRAME_BYTES};

use prost::Message;

/// One analysis request: the file to analyze plus the include search paths
/// the host extracted from the project configuration.
#[derive(Clone, PartialEq, Message)]
pub struct Request {
    /// Absolute path of the file to analyze.
    #[prost(string, tag = "1")]
    pub file: String,
    /// Include directories, in search order.
    #[prost(string, repeated, tag = "2")]
    pub search_paths: Vec<String>,
}

/// The daemon's verdict for one request. An empty `issues` list is a valid
/// "nothing found" response, not an error.
#[derive(Clone, PartialEq, Message)]
pub struct Response {
    #[prost(message, repeated, tag = "1")]
    pub issues: Vec<Issue>,
}

/// A single finding reported against the analyzed file.
#[derive(Clone, PartialEq, Message)]
pub struct Issue {
    #[prost(string, tag = "1")]
    pub message: String,
    /// 1-indexed line of the finding. Synthesized transport-failure issues
    /// use 0, since they are not tied to any source line.
    #[prost(uint32, tag = "2")]
    pub line: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_encodes_to_stable_bytes() {
        let request = Request {
            file: "a.cpp".to_string(),
            search_paths: vec!["/usr/include".to_string()],
        };
        // tag 1 (string) = 0x0a, tag 2 (string) = 0x12
        let bytes = request.encode_to_vec();
        assert_eq!(bytes[0], 0x0a);
        assert_eq!(bytes[1] as usize, "a.cpp".len());
        let second_field = 2 + "a.cpp".len();
        assert_eq!(bytes[second_field], 0x12);
    }

    #[test]
    fn test_response_decode_roundtrip() {
        let response = Response {
            issues: vec![
                Issue {
                    message: "missing include guard".to_string(),
                    line: 1,
                },
                Issue {
                    message: "unused parameter".to_string(),
                    line: 42,
                },
            ],
        };
        let decoded = Response::decode(response.encode_to_vec().as_slice()).unwrap();
        assert_eq!(decoded, response);
    }

    #[test]
    fn test_empty_response_is_valid() {
        let decoded = Response::decode(&[][..]).unwrap();
        assert!(decoded.issues.is_empty());
    }

    #[test]
    fn test_default_issue_line_is_zero() {
        assert_eq!(Issue::default().line, 0);
    }
}
