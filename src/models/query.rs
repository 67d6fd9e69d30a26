use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::str::FromStr;
use validator::Validate;
use wildmatch::WildMatch;

use super::{IncidentDto, IncidentStatus, PageParams, Severity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    CreationTime,
    StartTime,
    LastSeenTime,
    Severity,
    AlertsCount,
    Name,
}

/// Sort order in `[-]field` form, e.g. `-creation_time`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IncidentSort {
    pub field: SortField,
    pub descending: bool,
}

impl Default for IncidentSort {
    fn default() -> Self {
        Self {
            field: SortField::CreationTime,
            descending: true,
        }
    }
}

impl FromStr for IncidentSort {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (descending, name) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };

        let field = match name {
            "creation_time" => SortField::CreationTime,
            "start_time" => SortField::StartTime,
            "last_seen_time" => SortField::LastSeenTime,
            "severity" => SortField::Severity,
            "alerts_count" => SortField::AlertsCount,
            "name" => SortField::Name,
            other => return Err(format!("Unknown sort field: {}", other)),
        };

        Ok(Self { field, descending })
    }
}

impl TryFrom<String> for IncidentSort {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<IncidentSort> for String {
    fn from(sort: IncidentSort) -> Self {
        let name = match sort.field {
            SortField::CreationTime => "creation_time",
            SortField::StartTime => "start_time",
            SortField::LastSeenTime => "last_seen_time",
            SortField::Severity => "severity",
            SortField::AlertsCount => "alerts_count",
            SortField::Name => "name",
        };
        if sort.descending {
            format!("-{}", name)
        } else {
            name.to_string()
        }
    }
}

impl IncidentSort {
    pub fn compare(&self, a: &IncidentDto, b: &IncidentDto) -> Ordering {
        let ordering = match self.field {
            SortField::CreationTime => a.creation_time.cmp(&b.creation_time),
            SortField::StartTime => a.start_time.cmp(&b.start_time),
            SortField::LastSeenTime => a.last_seen_time.cmp(&b.last_seen_time),
            SortField::Severity => a.severity.cmp(&b.severity),
            SortField::AlertsCount => a.alerts_count.cmp(&b.alerts_count),
            SortField::Name => a.name().to_lowercase().cmp(&b.name().to_lowercase()),
        };
        // ties fall back to id so pages are stable
        let ordering = ordering.then_with(|| a.id.cmp(&b.id));
        if self.descending {
            ordering.reverse()
        } else {
            ordering
        }
    }
}

/// Filters, ordering and page for listing incidents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct IncidentQuery {
    #[serde(default = "default_confirmed")]
    pub confirmed: Option<bool>,
    #[serde(default)]
    pub predicted: Option<bool>,
    #[serde(default)]
    pub statuses: Vec<IncidentStatus>,
    #[serde(default)]
    pub severities: Vec<Severity>,
    #[serde(default)]
    pub assignees: Vec<String>,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub services: Vec<String>,
    /// Case-insensitive wildcard on the incident name
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub sorting: IncidentSort,
    #[serde(flatten)]
    #[validate(nested)]
    pub page: PageParams,
}

fn default_confirmed() -> Option<bool> {
    Some(true)
}

impl Default for IncidentQuery {
    fn default() -> Self {
        Self {
            confirmed: default_confirmed(),
            predicted: None,
            statuses: Vec::new(),
            severities: Vec::new(),
            assignees: Vec::new(),
            sources: Vec::new(),
            services: Vec::new(),
            search: None,
            sorting: IncidentSort::default(),
            page: PageParams::default(),
        }
    }
}

impl IncidentQuery {
    /// Predicted incidents awaiting confirmation
    pub fn predicted() -> Self {
        Self {
            confirmed: Some(false),
            predicted: Some(true),
            ..Self::default()
        }
    }

    pub fn matches(&self, incident: &IncidentDto) -> bool {
        if let Some(confirmed) = self.confirmed {
            if incident.is_confirmed != confirmed {
                return false;
            }
        }

        if let Some(predicted) = self.predicted {
            if incident.is_predicted != predicted {
                return false;
            }
        }

        if !self.statuses.is_empty() && !self.statuses.contains(&incident.status) {
            return false;
        }

        if !self.severities.is_empty() && !self.severities.contains(&incident.severity) {
            return false;
        }

        if !self.assignees.is_empty() {
            let assignee = incident.assignee.as_deref().unwrap_or("");
            if !self.assignees.iter().any(|a| a == assignee) {
                return false;
            }
        }

        if !self.sources.is_empty()
            && !incident.alert_sources.iter().any(|s| self.sources.contains(s))
        {
            return false;
        }

        if !self.services.is_empty() && !incident.services.iter().any(|s| self.services.contains(s)) {
            return false;
        }

        if let Some(pattern) = self.search.as_deref().filter(|p| !p.is_empty()) {
            let pattern = WildMatch::new(&pattern.to_lowercase());
            if !pattern.matches(&incident.name().to_lowercase()) {
                return false;
            }
        }

        true
    }
}
