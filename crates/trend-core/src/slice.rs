//! Independently refreshable piece of state with its own loading status.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum LoadState<T> {
    #[default]
    Idle,
    Loading,
    Loaded(T),
    Failed(String),
}

impl<T> LoadState<T> {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle      => "idle",
            Self::Loading   => "loading",
            Self::Loaded(_) => "loaded",
            Self::Failed(_) => "failed",
        }
    }
}

/// A `LoadState` that remembers the last good data, so a failed refresh can
/// keep showing what was there before.
#[derive(Debug, Clone)]
pub struct Slice<T: Clone> {
    state: LoadState<T>,
    last_good: Option<T>,
}

impl<T: Clone> Default for Slice<T> {
    fn default() -> Self {
        Self {
            state: LoadState::Idle,
            last_good: None,
        }
    }
}

impl<T: Clone> Slice<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with data from elsewhere (e.g. a cache) without marking it loaded.
    pub fn seeded(data: T) -> Self {
        Self {
            state: LoadState::Idle,
            last_good: Some(data),
        }
    }

    pub fn state(&self) -> &LoadState<T> {
        &self.state
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.state, LoadState::Loading)
    }

    /// Enter `Loading`. Returns false if a load is already in flight.
    pub fn begin(&mut self) -> bool {
        if self.is_loading() {
            return false;
        }
        self.state = LoadState::Loading;
        true
    }

    pub fn finish(&mut self, data: T) {
        self.last_good = Some(data.clone());
        self.state = LoadState::Loaded(data);
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.state = LoadState::Failed(error.into());
    }

    /// Current data, falling back to the last good value.
    pub fn data(&self) -> Option<&T> {
        match &self.state {
            LoadState::Loaded(d) => Some(d),
            _ => self.last_good.as_ref(),
        }
    }
}
