//! The tool catalog.
//!
//! Every dispatchable tool is one row in a static table: its endpoint family,
//! credit cost, provider, upstream endpoint, dispatch mode, and required
//! request fields. Handlers and reconciliation both resolve tools through
//! [`lookup_tool`], so cost and routing can never disagree between dispatch
//! and refund.

use serde::{Deserialize, Serialize};

use crate::GenerationKind;

/// Credit cost applied when a catalog row does not pin one.
pub const DEFAULT_TOOL_COST: i64 = 5;

/// Status paths tried in order for Veo-family tasks. The first endpoint that
/// answers HTTP 200 wins; deployments differ in which spelling they serve.
pub const VEO_STATUS_PATHS: &[&str] = &[
    "/api/v1/veo/record-info",
    "/api/v1/veo/recordInfo",
    "/api/v1/jobs/recordInfo",
];

/// Status path for task-based music generation.
pub const MUSIC_STATUS_PATHS: &[&str] = &["/api/v1/generate/record-info"];

/// The endpoint family a tool is served under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolFamily {
    /// `POST /v1/tools/image`
    Image,
    /// `POST /v1/tools/video`
    Video,
    /// `POST /v1/tools/cinema`
    Cinema,
    /// `POST /v1/tools/music`
    Music,
}

impl ToolFamily {
    /// The family name as it appears in the URL path.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Cinema => "cinema",
            Self::Music => "music",
        }
    }
}

/// Which third-party provider serves a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    /// Fal-style API: synchronous model runs and queue submissions.
    Fal,
    /// Kie-style API: task creation plus record-info polling.
    Kie,
}

/// How a tool's provider call behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// Provider returns the output in the dispatch response.
    Sync,
    /// Provider queue returns a request ID to poll.
    Queue,
    /// Provider task API returns a task ID to poll.
    Task,
    /// One queue submission per storyboard scene, linked by a batch.
    FanOut,
}

/// One row of the tool catalog.
#[derive(Debug, Clone, Copy)]
pub struct ToolSpec {
    /// Tool identifier as sent by clients.
    pub name: &'static str,
    /// Endpoint family the tool is served under.
    pub family: ToolFamily,
    /// Media kind of the output.
    pub kind: GenerationKind,
    /// Credit cost. `None` falls back to [`DEFAULT_TOOL_COST`]. For fan-out
    /// tools this is the per-scene cost.
    pub cost: Option<i64>,
    /// Provider that serves the tool.
    pub provider: Provider,
    /// Fal model identifier or Kie submission path.
    pub endpoint: &'static str,
    /// Dispatch behavior.
    pub mode: DispatchMode,
    /// Request fields that must be present, checked before any debit.
    pub requires: &'static [&'static str],
    /// Ordered candidate status paths for task tools; empty for Fal tools,
    /// whose status endpoint derives from the model identifier.
    pub status_paths: &'static [&'static str],
}

impl ToolSpec {
    /// Credit cost for one invocation (one scene, for fan-out tools).
    #[must_use]
    pub fn cost(&self) -> i64 {
        self.cost.unwrap_or(DEFAULT_TOOL_COST)
    }

    /// Whether the dispatch response carries the output immediately.
    #[must_use]
    pub const fn is_sync(&self) -> bool {
        matches!(self.mode, DispatchMode::Sync)
    }
}

/// The full catalog. One row per dispatchable tool.
pub const TOOLS: &[ToolSpec] = &[
    // ===== Image family (synchronous Fal runs) =====
    ToolSpec {
        name: "upscale",
        family: ToolFamily::Image,
        kind: GenerationKind::Image,
        cost: Some(3),
        provider: Provider::Fal,
        endpoint: "fal-ai/esrgan",
        mode: DispatchMode::Sync,
        requires: &["imageUrl"],
        status_paths: &[],
    },
    ToolSpec {
        name: "remove-background",
        family: ToolFamily::Image,
        kind: GenerationKind::Image,
        cost: Some(2),
        provider: Provider::Fal,
        endpoint: "fal-ai/birefnet",
        mode: DispatchMode::Sync,
        requires: &["imageUrl"],
        status_paths: &[],
    },
    ToolSpec {
        name: "style-transfer",
        family: ToolFamily::Image,
        kind: GenerationKind::Image,
        cost: Some(4),
        provider: Provider::Fal,
        endpoint: "fal-ai/flux/dev/image-to-image",
        mode: DispatchMode::Sync,
        requires: &["imageUrl", "prompt"],
        status_paths: &[],
    },
    ToolSpec {
        name: "text-to-image",
        family: ToolFamily::Image,
        kind: GenerationKind::Image,
        cost: Some(5),
        provider: Provider::Fal,
        endpoint: "fal-ai/flux/dev",
        mode: DispatchMode::Sync,
        requires: &["prompt"],
        status_paths: &[],
    },
    // No pinned cost; billed at the default.
    ToolSpec {
        name: "colorize",
        family: ToolFamily::Image,
        kind: GenerationKind::Image,
        cost: None,
        provider: Provider::Fal,
        endpoint: "fal-ai/ddcolor",
        mode: DispatchMode::Sync,
        requires: &["imageUrl"],
        status_paths: &[],
    },
    // ===== Video family =====
    ToolSpec {
        name: "lip-sync",
        family: ToolFamily::Video,
        kind: GenerationKind::Video,
        cost: Some(20),
        provider: Provider::Fal,
        endpoint: "fal-ai/sync-lipsync",
        mode: DispatchMode::Queue,
        requires: &["videoUrl", "audioUrl"],
        status_paths: &[],
    },
    ToolSpec {
        name: "image-to-video",
        family: ToolFamily::Video,
        kind: GenerationKind::Video,
        cost: Some(15),
        provider: Provider::Kie,
        endpoint: "/api/v1/veo/generate",
        mode: DispatchMode::Task,
        requires: &["imageUrl"],
        status_paths: VEO_STATUS_PATHS,
    },
    ToolSpec {
        name: "story-animate",
        family: ToolFamily::Video,
        kind: GenerationKind::Video,
        cost: Some(12),
        provider: Provider::Fal,
        endpoint: "fal-ai/kling-video/v1.6/standard/image-to-video",
        mode: DispatchMode::FanOut,
        requires: &["scenes"],
        status_paths: &[],
    },
    // ===== Cinema family =====
    ToolSpec {
        name: "cinematic",
        family: ToolFamily::Cinema,
        kind: GenerationKind::Video,
        cost: Some(25),
        provider: Provider::Kie,
        endpoint: "/api/v1/veo/generate",
        mode: DispatchMode::Task,
        requires: &["prompt"],
        status_paths: VEO_STATUS_PATHS,
    },
    // ===== Music family =====
    ToolSpec {
        name: "text-to-music",
        family: ToolFamily::Music,
        kind: GenerationKind::Music,
        cost: Some(10),
        provider: Provider::Kie,
        endpoint: "/api/v1/generate",
        mode: DispatchMode::Task,
        requires: &["prompt"],
        status_paths: MUSIC_STATUS_PATHS,
    },
];

/// Resolve a tool by family and name.
///
/// Returns `None` for unknown tools and for known tools requested under the
/// wrong family; callers turn both into the same "unknown tool" error.
#[must_use]
pub fn lookup_tool(family: ToolFamily, name: &str) -> Option<&'static ToolSpec> {
    TOOLS.iter().find(|t| t.family == family && t.name == name)
}

/// Resolve a tool by name alone, for reconciliation of persisted rows.
#[must_use]
pub fn lookup_tool_by_name(name: &str) -> Option<&'static ToolSpec> {
    TOOLS.iter().find(|t| t.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lip_sync_costs_twenty_on_sync_lipsync() {
        let spec = lookup_tool(ToolFamily::Video, "lip-sync").unwrap();
        assert_eq!(spec.cost(), 20);
        assert_eq!(spec.endpoint, "fal-ai/sync-lipsync");
        assert!(matches!(spec.mode, DispatchMode::Queue));
    }

    #[test]
    fn upscale_costs_three() {
        let spec = lookup_tool(ToolFamily::Image, "upscale").unwrap();
        assert_eq!(spec.cost(), 3);
        assert!(spec.is_sync());
    }

    #[test]
    fn unpinned_cost_falls_back_to_default() {
        let spec = lookup_tool(ToolFamily::Image, "colorize").unwrap();
        assert_eq!(spec.cost(), DEFAULT_TOOL_COST);
    }

    #[test]
    fn unknown_tool_is_none() {
        assert!(lookup_tool(ToolFamily::Image, "nonexistent").is_none());
    }

    #[test]
    fn family_mismatch_is_none() {
        // lip-sync exists, but not under the image family
        assert!(lookup_tool(ToolFamily::Image, "lip-sync").is_none());
        assert!(lookup_tool(ToolFamily::Video, "lip-sync").is_some());
    }

    #[test]
    fn veo_tools_carry_ordered_fallback_paths() {
        let spec = lookup_tool(ToolFamily::Cinema, "cinematic").unwrap();
        assert_eq!(spec.status_paths, VEO_STATUS_PATHS);
        assert!(spec.status_paths.len() > 1);
    }

    #[test]
    fn every_tool_resolves_by_name() {
        for tool in TOOLS {
            let found = lookup_tool_by_name(tool.name).unwrap();
            assert_eq!(found.family, tool.family);
        }
    }

    #[test]
    fn catalog_names_are_unique() {
        for (i, a) in TOOLS.iter().enumerate() {
            for b in &TOOLS[i + 1..] {
                assert_ne!(a.name, b.name, "duplicate catalog entry");
            }
        }
    }
}
