//! Intro/outro skip windows

use serde::{Deserialize, Serialize};

/// Half-open `[start, end)` interval in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SkipWindow {
    pub start: f64,
    pub end: f64,
}

impl SkipWindow {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, time: f64) -> bool {
        time >= self.start && time < self.end
    }
}

/// Returns true when `time` falls inside `window`
pub fn is_in_window(time: f64, window: Option<&SkipWindow>) -> bool {
    window.is_some_and(|w| w.contains(time))
}

/// Which window a skip targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkipKind {
    Intro,
    Outro,
}

/// Intro and outro windows for one media item
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SkipWindows {
    #[serde(default)]
    pub intro: Option<SkipWindow>,
    #[serde(default)]
    pub outro: Option<SkipWindow>,
}

impl SkipWindows {
    pub fn new(intro: Option<SkipWindow>, outro: Option<SkipWindow>) -> Self {
        Self { intro, outro }
    }

    pub fn get(&self, kind: SkipKind) -> Option<&SkipWindow> {
        match kind {
            SkipKind::Intro => self.intro.as_ref(),
            SkipKind::Outro => self.outro.as_ref(),
        }
    }

    /// Visibility of the (intro, outro) skip affordances at `time`
    pub fn visibility(&self, time: f64) -> (bool, bool) {
        (
            is_in_window(time, self.intro.as_ref()),
            is_in_window(time, self.outro.as_ref()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_half_open_boundaries() {
        let window = SkipWindow::new(30.0, 90.0);
        assert!(is_in_window(30.0, Some(&window)));
        assert!(is_in_window(89.999, Some(&window)));
        assert!(!is_in_window(90.0, Some(&window)));
        assert!(!is_in_window(29.9, Some(&window)));
        assert!(!is_in_window(45.0, None));
    }

    #[test]
    fn test_visibility_is_independent() {
        let windows = SkipWindows::new(
            Some(SkipWindow::new(0.0, 90.0)),
            Some(SkipWindow::new(1300.0, 1420.0)),
        );
        assert_eq!(windows.visibility(10.0), (true, false));
        assert_eq!(windows.visibility(500.0), (false, false));
        assert_eq!(windows.visibility(1350.0), (false, true));
    }

    #[test]
    fn test_deserialize_partial() {
        let windows: SkipWindows = serde_json::from_str(r#"{"intro":{"start":5,"end":95}}"#).unwrap();
        assert_eq!(windows.intro, Some(SkipWindow::new(5.0, 95.0)));
        assert!(windows.outro.is_none());
    }
}
