//! Render surface: maps a [`TreeState`] snapshot to a view description.
//!
//! [`render`] decides *what* is shown; [`lines`] lays it out as text. The
//! CLI colors lines by [`LineKind`] and `--json` serializes the view as-is.

use serde::Serialize;

use super::model::TreeState;

/// Message shown when a finished fetch produced nothing.
pub const NO_DATASETS_FOUND_MESSAGE: &str = "No Datasets found";

/// Top-level view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum TreeView {
    /// Viewer not authorized: nothing is drawn.
    Hidden,
    Visible(TreePanel),
}

/// Path field, refresh affordance, node list and status line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreePanel {
    pub path: String,
    /// The refresh affordance shows its busy state.
    pub refreshing: bool,
    pub body: TreeBody,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// What goes in the node list area.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "nodes", rename_all = "snake_case")]
pub enum TreeBody {
    /// Children, ordered by identifier.
    Nodes(Vec<NodeView>),
    /// Empty result and nothing outstanding.
    NotFound,
    /// Empty result while a fetch is outstanding: draw nothing.
    Pending,
}

/// One child row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeView {
    pub id: String,
    pub organization: String,
    pub expanded: bool,
    pub has_members: bool,
    /// Members, present only for expanded children whose members loaded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub members: Option<Vec<String>>,
}

/// Build the view for a snapshot.
#[must_use]
pub fn render(state: &TreeState) -> TreeView {
    if !state.validated {
        return TreeView::Hidden;
    }

    // BTreeMap iteration is already ordered by identifier.
    let body = if state.children.is_empty() {
        if state.is_fetching {
            TreeBody::Pending
        } else {
            TreeBody::NotFound
        }
    } else {
        TreeBody::Nodes(
            state
                .children
                .iter()
                .map(|(id, child)| NodeView {
                    id: id.clone(),
                    organization: child.organization.label().to_string(),
                    expanded: child.expanded,
                    has_members: child.organization.has_members(),
                    members: if child.expanded {
                        child.members.clone()
                    } else {
                        None
                    },
                })
                .collect(),
        )
    };

    TreeView::Visible(TreePanel {
        path: state.path.clone(),
        refreshing: state.is_fetching,
        body,
        status: state.last_error.clone(),
    })
}

// ──────────────────── text layout ────────────────────

/// Semantic class of a laid-out line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Header,
    Node,
    Member,
    Placeholder,
    NotFound,
    Status,
}

/// One laid-out line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub kind: LineKind,
    pub text: String,
}

impl Line {
    fn new(kind: LineKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }
}

/// Lay out a view as text lines. `Hidden` lays out as nothing.
#[must_use]
pub fn lines(view: &TreeView) -> Vec<Line> {
    let TreeView::Visible(panel) = view else {
        return Vec::new();
    };

    let refresh = if panel.refreshing {
        "[refreshing]"
    } else {
        "[refresh]"
    };
    let mut out = vec![Line::new(
        LineKind::Header,
        format!("path> {}  {refresh}", panel.path),
    )];

    match &panel.body {
        TreeBody::Nodes(nodes) => {
            for node in nodes {
                let marker = match (node.has_members, node.expanded) {
                    (true, true) => '-',
                    (true, false) => '+',
                    (false, _) => ' ',
                };
                out.push(Line::new(
                    LineKind::Node,
                    format!("{marker} {} ({})", node.id, node.organization),
                ));
                if node.expanded && node.has_members {
                    match &node.members {
                        Some(members) if members.is_empty() => {
                            out.push(Line::new(LineKind::Placeholder, "    (no members)"));
                        }
                        Some(members) => {
                            out.extend(
                                members
                                    .iter()
                                    .map(|m| Line::new(LineKind::Member, format!("    {m}"))),
                            );
                        }
                        None => out.push(Line::new(LineKind::Placeholder, "    (loading)")),
                    }
                }
            }
        }
        TreeBody::NotFound => {
            out.push(Line::new(
                LineKind::NotFound,
                format!("! {NO_DATASETS_FOUND_MESSAGE}"),
            ));
        }
        TreeBody::Pending => {}
    }

    if let Some(status) = &panel.status {
        out.push(Line::new(LineKind::Status, format!("status: {status}")));
    }
    out
}

/// Plain-text rendering, one line per row.
#[must_use]
pub fn to_text(view: &TreeView) -> String {
    let mut text = String::new();
    for line in lines(view) {
        text.push_str(&line.text);
        text.push('\n');
    }
    text
}
