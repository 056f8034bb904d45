//! Typed module requests.
//!
//! Every module id atoll owns round-trips through [`ModuleRequest`], so
//! dispatch happens on an enum match instead of scattered prefix checks. The
//! string forms exist only at the pipeline boundary — ids must be embeddable
//! in generated import statements, hence no `\0` bytes.

use crate::paths::parse_id;

/// Synthetic client entry importing every server component (style phase).
pub const CLIENT_ENTRY_ID: &str = "@atoll/client-entry";
/// Synthetic server entry re-exporting every component (server phase).
pub const SERVER_ENTRY_ID: &str = "@atoll/server-entry";
/// The island nesting flag module.
pub const ISLAND_FLAG_ID: &str = "@atoll/island-flag";
/// The hydration bootstrap module (and its manifest key).
pub const CUSTOM_ELEMENT_ID: &str = "@atoll/element";
/// Browser-facing path of the bootstrap module in dev.
pub const CUSTOM_ELEMENT_PUBLIC_PATH: &str = "/@atoll/element";

const SERVER_WRAPPER_PREFIX: &str = "@atoll/server-wrapper:";
const ISLAND_WRAPPER_PREFIX: &str = "@atoll/island-wrapper:";

/// A module request atoll knows how to resolve and load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleRequest {
    /// The raw component source, bypassing wrapper redirection.
    RawSource(String),
    /// Server wrapper around a component (stylesheet bookkeeping).
    ServerWrapper(String),
    /// Island wrapper around a component (hydration host emission).
    IslandWrapper(String),
    ClientEntry,
    ServerEntry,
    IslandFlag,
    CustomElement,
}

impl ModuleRequest {
    /// Decode a module id. Returns `None` for ids atoll does not own.
    pub fn parse(id: &str) -> Option<Self> {
        match id {
            CLIENT_ENTRY_ID => return Some(Self::ClientEntry),
            SERVER_ENTRY_ID => return Some(Self::ServerEntry),
            ISLAND_FLAG_ID => return Some(Self::IslandFlag),
            CUSTOM_ELEMENT_ID | CUSTOM_ELEMENT_PUBLIC_PATH => return Some(Self::CustomElement),
            _ => {}
        }

        if let Some(path) = id.strip_prefix(SERVER_WRAPPER_PREFIX) {
            return Some(Self::ServerWrapper(path.to_string()));
        }
        if let Some(path) = id.strip_prefix(ISLAND_WRAPPER_PREFIX) {
            return Some(Self::IslandWrapper(path.to_string()));
        }

        let parsed = parse_id(id);
        if parsed.query.original {
            return Some(Self::RawSource(parsed.file_name.to_string()));
        }

        None
    }

    /// The canonical string id for this request.
    pub fn id(&self) -> String {
        match self {
            Self::RawSource(path) => format!("{path}?original"),
            Self::ServerWrapper(path) => format!("{SERVER_WRAPPER_PREFIX}{path}"),
            Self::IslandWrapper(path) => format!("{ISLAND_WRAPPER_PREFIX}{path}"),
            Self::ClientEntry => CLIENT_ENTRY_ID.to_string(),
            Self::ServerEntry => SERVER_ENTRY_ID.to_string(),
            Self::IslandFlag => ISLAND_FLAG_ID.to_string(),
            Self::CustomElement => CUSTOM_ELEMENT_ID.to_string(),
        }
    }

    /// Whether an id names one of the generated wrapper modules.
    pub fn is_wrapper_id(id: &str) -> bool {
        id.starts_with(SERVER_WRAPPER_PREFIX) || id.starts_with(ISLAND_WRAPPER_PREFIX)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrappers_round_trip() {
        for request in [
            ModuleRequest::RawSource("/src/A.vue".to_string()),
            ModuleRequest::ServerWrapper("/src/A.vue".to_string()),
            ModuleRequest::IslandWrapper("/src/A.vue".to_string()),
            ModuleRequest::ClientEntry,
            ModuleRequest::ServerEntry,
            ModuleRequest::IslandFlag,
            ModuleRequest::CustomElement,
        ] {
            assert_eq!(ModuleRequest::parse(&request.id()), Some(request));
        }
    }

    #[test]
    fn public_element_path_decodes_to_custom_element() {
        assert_eq!(
            ModuleRequest::parse(CUSTOM_ELEMENT_PUBLIC_PATH),
            Some(ModuleRequest::CustomElement)
        );
    }

    #[test]
    fn plain_component_ids_are_not_ours() {
        assert_eq!(ModuleRequest::parse("/src/A.vue"), None);
        assert_eq!(ModuleRequest::parse("/src/A.vue?vue&type=style"), None);
        assert_eq!(ModuleRequest::parse("vue"), None);
    }

    #[test]
    fn wrapper_detection() {
        assert!(ModuleRequest::is_wrapper_id("@atoll/server-wrapper:/a.vue"));
        assert!(ModuleRequest::is_wrapper_id("@atoll/island-wrapper:/a.vue"));
        assert!(!ModuleRequest::is_wrapper_id("/a.vue"));
    }
}
