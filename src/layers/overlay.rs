//! HTML overlay kept in sync with the camera of engines that cannot host
//! HTML markers themselves.
//!
//! Each node remembers its geographic position; after every pan or zoom the
//! provider calls [`OverlayLayer::reposition`] with the engine's
//! world-to-screen projection and each node's CSS translate is rewritten.

use crate::{
    core::{geo::LatLng, geo::Point, viewport::Viewport},
    prelude::HashMap,
    traits::ViewportAware,
    Result,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OverlayNodeId(u64);

/// One absolutely positioned element in the overlay container
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayNode {
    pub position: LatLng,
    pub html: String,
    pub z_index: i32,
    /// Top-left translate in container pixels, set by the last reposition
    pub translate: Option<Point>,
    /// Hidden when the engine cannot project the position (yet)
    pub visible: bool,
}

impl OverlayNode {
    /// Inline style the binding writes onto the element
    pub fn style(&self) -> String {
        match (self.visible, self.translate) {
            (true, Some(t)) => format!(
                "position:absolute;transform:translate({:.0}px,{:.0}px);z-index:{};",
                t.x, t.y, self.z_index
            ),
            _ => "display:none;".to_string(),
        }
    }
}

#[derive(Debug, Default)]
pub struct OverlayLayer {
    container_id: Option<String>,
    nodes: HashMap<OverlayNodeId, OverlayNode>,
    render_order: Vec<OverlayNodeId>,
    next_id: u64,
    reposition_passes: u64,
}

impl OverlayLayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Anchors the layer inside the map container
    pub fn attach(&mut self, container_id: &str) {
        self.container_id = Some(format!("{container_id}__overlay"));
    }

    /// Removes every node and detaches the layer from the container
    pub fn detach(&mut self) {
        self.nodes.clear();
        self.render_order.clear();
        self.container_id = None;
    }

    pub fn is_attached(&self) -> bool {
        self.container_id.is_some()
    }

    pub fn container_id(&self) -> Option<&str> {
        self.container_id.as_deref()
    }

    pub fn add_node(&mut self, position: LatLng, html: String, z_index: i32) -> OverlayNodeId {
        self.next_id += 1;
        let id = OverlayNodeId(self.next_id);
        self.nodes.insert(
            id,
            OverlayNode {
                position,
                html,
                z_index,
                translate: None,
                visible: false,
            },
        );

        let insert_pos = self
            .render_order
            .iter()
            .position(|other| {
                self.nodes
                    .get(other)
                    .map(|n| n.z_index > z_index)
                    .unwrap_or(false)
            })
            .unwrap_or(self.render_order.len());
        self.render_order.insert(insert_pos, id);
        id
    }

    pub fn update_node(&mut self, id: OverlayNodeId, html: String, z_index: i32) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.html = html;
            if node.z_index != z_index {
                node.z_index = z_index;
                self.sort_render_order();
            }
        }
    }

    /// Moves a node and positions it right away with `project`
    pub fn move_node<P>(&mut self, id: OverlayNodeId, position: LatLng, project: P)
    where
        P: Fn(&LatLng) -> Option<Point>,
    {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.position = position;
            Self::place(node, &project);
        }
    }

    pub fn remove_node(&mut self, id: OverlayNodeId) -> Option<OverlayNode> {
        self.render_order.retain(|other| *other != id);
        self.nodes.remove(&id)
    }

    pub fn node(&self, id: OverlayNodeId) -> Option<&OverlayNode> {
        self.nodes.get(&id)
    }

    /// Nodes bottom to top
    pub fn nodes(&self) -> impl Iterator<Item = &OverlayNode> {
        self.render_order.iter().filter_map(|id| self.nodes.get(id))
    }

    /// Recomputes every node's screen position. Ids that disappeared from
    /// the layer while the pass runs are skipped.
    pub fn reposition<P>(&mut self, project: P)
    where
        P: Fn(&LatLng) -> Option<Point>,
    {
        self.reposition_passes += 1;
        for id in self.render_order.clone() {
            if let Some(node) = self.nodes.get_mut(&id) {
                Self::place(node, &project);
            }
        }
    }

    /// Number of full reposition passes run so far
    pub fn reposition_passes(&self) -> u64 {
        self.reposition_passes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn place<P>(node: &mut OverlayNode, project: &P)
    where
        P: Fn(&LatLng) -> Option<Point>,
    {
        match project(&node.position) {
            Some(point) if point.x.is_finite() && point.y.is_finite() => {
                node.translate = Some(point.round());
                node.visible = true;
            }
            _ => {
                node.visible = false;
            }
        }
    }

    fn sort_render_order(&mut self) {
        let nodes = &self.nodes;
        self.render_order.sort_by_key(|id| nodes.get(id).map(|n| n.z_index).unwrap_or(0));
    }
}

impl ViewportAware for OverlayLayer {
    fn on_viewport_changed(&mut self, viewport: &Viewport) -> Result<()> {
        self.reposition(|position| Some(viewport.lat_lng_to_pixel(position)));
        Ok(())
    }
}
