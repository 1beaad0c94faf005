//! Incremental arc state for globe renderers
//!
//! The canonical collection only ever grows: a known arc id keeps its slot
//! and has `latency`, `color` and `distance` refreshed in place, so a
//! renderer holding indices never sees an arc jump or blink. Filters
//! select a view over the canonical collection and never remove from it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::topology::LatencyArc;

pub const DEFAULT_PROVIDERS: [&str; 4] = ["AWS", "Azure", "GCP", "Equinix"];

pub const DEFAULT_REGIONS: [(&str, &str); 10] = [
    ("United States", "US"),
    ("United Kingdom", "GB"),
    ("Singapore", "SG"),
    ("Germany", "DE"),
    ("Japan", "JP"),
    ("India", "IN"),
    ("Australia", "AU"),
    ("Brazil", "BR"),
    ("France", "FR"),
    ("South Africa", "ZA"),
];

/// A selectable region in filter UIs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionOption {
    pub label: String,
    pub value: String,
}

/// Active filter predicates; all of them must hold for an arc to be shown
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterState {
    /// Exact matches against `target_provider`
    pub providers: Vec<String>,
    /// Case-insensitive substrings of either endpoint's location
    pub regions: Vec<String>,
    /// Inclusive lower latency bound
    pub min_latency: Option<f64>,
    /// Inclusive upper latency bound
    pub max_latency: Option<f64>,
}

impl FilterState {
    pub fn is_active(&self) -> bool {
        !self.providers.is_empty()
            || !self.regions.is_empty()
            || self.min_latency.is_some()
            || self.max_latency.is_some()
    }

    pub fn matches(&self, arc: &LatencyArc) -> bool {
        if !self.providers.is_empty() && !self.providers.contains(&arc.target_provider) {
            return false;
        }

        if !self.regions.is_empty() {
            let source = arc.source_location.to_lowercase();
            let target = arc.target_location.to_lowercase();
            let hit = self.regions.iter().any(|region| {
                let region = region.to_lowercase();
                source.contains(&region) || target.contains(&region)
            });
            if !hit {
                return false;
            }
        }

        if self.min_latency.is_some_and(|min| arc.latency < min) {
            return false;
        }
        if self.max_latency.is_some_and(|max| arc.latency > max) {
            return false;
        }
        true
    }
}

/// Partial filter change; `None` leaves the current value untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterUpdate {
    pub providers: Option<Vec<String>>,
    pub regions: Option<Vec<String>>,
    pub min_latency: Option<f64>,
    pub max_latency: Option<f64>,
}

/// Latency summary over the filtered view
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ArcStats {
    pub count: usize,
    pub min_latency: Option<f64>,
    pub max_latency: Option<f64>,
    pub mean_latency: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct ArcStore {
    arcs: Vec<LatencyArc>,
    index: HashMap<String, usize>,
    filtered_arcs: Vec<LatencyArc>,
    filters: FilterState,
    all_providers: Vec<String>,
    all_regions: Vec<RegionOption>,
}

impl Default for ArcStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ArcStore {
    pub fn new() -> Self {
        Self {
            arcs: Vec::new(),
            index: HashMap::new(),
            filtered_arcs: Vec::new(),
            filters: FilterState::default(),
            all_providers: DEFAULT_PROVIDERS.iter().map(|p| p.to_string()).collect(),
            all_regions: DEFAULT_REGIONS
                .iter()
                .map(|(label, value)| RegionOption {
                    label: label.to_string(),
                    value: value.to_string(),
                })
                .collect(),
        }
    }

    /// Canonical collection in first-seen order
    pub fn arcs(&self) -> &[LatencyArc] {
        &self.arcs
    }

    pub fn filtered_arcs(&self) -> &[LatencyArc] {
        &self.filtered_arcs
    }

    pub fn filters(&self) -> &FilterState {
        &self.filters
    }

    pub fn get(&self, id: &str) -> Option<&LatencyArc> {
        self.index.get(id).map(|&i| &self.arcs[i])
    }

    /// Merge a batch of arcs, last write wins per id
    pub fn merge_updates(&mut self, updates: Vec<LatencyArc>) {
        for update in &updates {
            match self.index.get(&update.id) {
                Some(&i) => refresh(&mut self.arcs[i], update),
                None => {
                    self.index.insert(update.id.clone(), self.arcs.len());
                    self.arcs.push(update.clone());
                }
            }
        }

        let filtering = self.filters.is_active();
        for update in updates {
            match self.filtered_arcs.iter_mut().find(|a| a.id == update.id) {
                Some(existing) => refresh(existing, &update),
                None if !filtering => self.filtered_arcs.push(update),
                None => {}
            }
        }

        if filtering {
            self.apply_filters();
        }
    }

    /// Change only the provided filter fields; call [`Self::apply_filters`] to refresh the view
    pub fn set_filters(&mut self, update: FilterUpdate) {
        if let Some(providers) = update.providers {
            self.filters.providers = providers;
        }
        if let Some(regions) = update.regions {
            self.filters.regions = regions;
        }
        if let Some(min) = update.min_latency {
            self.filters.min_latency = Some(min);
        }
        if let Some(max) = update.max_latency {
            self.filters.max_latency = Some(max);
        }
    }

    /// Recompute the filtered view from the canonical collection
    pub fn apply_filters(&mut self) {
        self.filtered_arcs = self
            .arcs
            .iter()
            .filter(|arc| self.filters.matches(arc))
            .cloned()
            .collect();
    }

    /// Clear every filter and show the whole collection
    pub fn reset_filters(&mut self) {
        self.filters = FilterState::default();
        self.filtered_arcs = self.arcs.clone();
    }

    pub fn providers(&self) -> &[String] {
        &self.all_providers
    }

    pub fn set_all_providers(&mut self, providers: Vec<String>) {
        self.all_providers = providers;
    }

    pub fn regions(&self) -> &[RegionOption] {
        &self.all_regions
    }

    pub fn stats(&self) -> ArcStats {
        let latencies = self.filtered_arcs.iter().map(|a| a.latency);
        let count = self.filtered_arcs.len();
        if count == 0 {
            return ArcStats {
                count,
                min_latency: None,
                max_latency: None,
                mean_latency: None,
            };
        }
        let min = latencies.clone().fold(f64::INFINITY, f64::min);
        let max = latencies.clone().fold(f64::NEG_INFINITY, f64::max);
        let mean = latencies.sum::<f64>() / count as f64;
        ArcStats {
            count,
            min_latency: Some(min),
            max_latency: Some(max),
            mean_latency: Some(mean),
        }
    }
}

fn refresh(existing: &mut LatencyArc, update: &LatencyArc) {
    existing.latency = update.latency;
    existing.color = update.color;
    existing.distance = update.distance;
}
