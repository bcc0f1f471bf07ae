use crate::{core::constants::MAX_VISIBLE_ROUTES, input::events::EventHandled};
use serde::Serialize;

/// Badge listing the routes that serve a stop. Collapsed it shows the first
/// few short-names plus a `+N` affordance; clicking toggles the full list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteLabel {
    routes: Vec<String>,
    max_visible: usize,
    expanded: bool,
}

impl RouteLabel {
    pub fn new(routes: Vec<String>) -> Self {
        Self::with_max_visible(routes, MAX_VISIBLE_ROUTES)
    }

    pub fn with_max_visible(routes: Vec<String>, max_visible: usize) -> Self {
        Self {
            routes,
            max_visible: max_visible.max(1),
            expanded: false,
        }
    }

    pub fn routes(&self) -> &[String] {
        &self.routes
    }

    pub fn is_expanded(&self) -> bool {
        self.expanded
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Route names currently displayed
    pub fn visible_routes(&self) -> &[String] {
        if self.expanded || self.routes.len() <= self.max_visible {
            &self.routes
        } else {
            &self.routes[..self.max_visible]
        }
    }

    /// `+N` text while collapsed with hidden routes
    pub fn overflow_badge(&self) -> Option<String> {
        let hidden = self.routes.len().saturating_sub(self.visible_routes().len());
        (hidden > 0).then(|| format!("+{hidden}"))
    }

    /// Click on the label itself. Always consumed so the marker underneath
    /// never sees it.
    pub fn click(&mut self) -> EventHandled {
        if self.routes.len() > self.max_visible {
            self.expanded = !self.expanded;
        }
        EventHandled::Handled
    }

    pub fn to_html(&self) -> String {
        let mut html = String::from(r#"<div class="route-label" data-stop-propagation="true">"#);
        for route in self.visible_routes() {
            html.push_str(&format!(
                r#"<span class="route-label__route">{}</span>"#,
                escape_html(route)
            ));
        }
        if let Some(badge) = self.overflow_badge() {
            html.push_str(&format!(r#"<span class="route-label__more">{badge}</span>"#));
        }
        html.push_str("</div>");
        html
    }
}

/// Minimal escaping for text placed in marker and popup markup
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn five_routes() -> RouteLabel {
        RouteLabel::new(
            ["8", "10", "43", "49", "E Line"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        )
    }

    #[test]
    fn test_collapsed_shows_three_and_badge() {
        let label = five_routes();
        assert_eq!(label.visible_routes(), &["8", "10", "43"]);
        assert_eq!(label.overflow_badge().as_deref(), Some("+2"));
        assert!(label.to_html().contains("+2"));
    }

    #[test]
    fn test_click_expands_and_collapses() {
        let mut label = five_routes();
        assert_eq!(label.click(), EventHandled::Handled);
        assert!(label.is_expanded());
        assert_eq!(label.visible_routes().len(), 5);
        assert!(label.overflow_badge().is_none());

        label.click();
        assert_eq!(label.visible_routes().len(), 3);
    }

    #[test]
    fn test_short_list_never_expands() {
        let mut label = RouteLabel::new(vec!["8".into(), "10".into()]);
        assert!(label.overflow_badge().is_none());
        label.click();
        assert!(!label.is_expanded());
    }

    #[test]
    fn test_names_are_escaped() {
        let label = RouteLabel::new(vec!["<b>".into()]);
        assert!(label.to_html().contains("&lt;b&gt;"));
    }
}
