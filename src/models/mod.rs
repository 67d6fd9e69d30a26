// Public exports for data models

pub mod alert;
pub mod candidate;
pub mod incident;
pub mod meta;
pub mod pagination;
pub mod query;

pub use alert::{AlertDto, AlertStatus, Severity};
pub use candidate::IncidentCandidateDto;
pub use incident::{IncidentDto, IncidentDtoIn, IncidentStatus};
pub use meta::IncidentsMetaDto;
pub use pagination::{PageParams, Paginated, PaginatedIncidentAlertsDto, PaginatedIncidentsDto};
pub use query::{IncidentQuery, IncidentSort, SortField};
