use serde::{Deserialize, Serialize};

use super::domain::WorkerId;
use super::store::{ComplianceStore, StoreError};

/// The ways a caller can point at a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "WorkerRefPayload", into = "WorkerRefPayload")]
pub enum WorkerRef {
    ById(WorkerId),
    /// A worker-shaped record; `worker_id` wins over `id`.
    ByRecord {
        worker_id: Option<WorkerId>,
        id: Option<WorkerId>,
    },
    ByEmployeeId(String),
}

impl From<WorkerId> for WorkerRef {
    fn from(value: WorkerId) -> Self {
        Self::ById(value)
    }
}

impl From<&WorkerId> for WorkerRef {
    fn from(value: &WorkerId) -> Self {
        Self::ById(value.clone())
    }
}

/// Wire form: either a bare id string or an object with `workerId`, `id`, or `employeeId`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum WorkerRefPayload {
    Id(String),
    Object {
        #[serde(default, rename = "workerId", skip_serializing_if = "Option::is_none")]
        worker_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(default, rename = "employeeId", skip_serializing_if = "Option::is_none")]
        employee_id: Option<String>,
    },
}

impl From<WorkerRefPayload> for WorkerRef {
    fn from(payload: WorkerRefPayload) -> Self {
        match payload {
            WorkerRefPayload::Id(id) => Self::ById(WorkerId(id)),
            WorkerRefPayload::Object {
                worker_id,
                id,
                employee_id,
            } => match (worker_id, id, employee_id) {
                (None, None, Some(employee_id)) => Self::ByEmployeeId(employee_id),
                (worker_id, id, _) => Self::ByRecord {
                    worker_id: worker_id.map(WorkerId),
                    id: id.map(WorkerId),
                },
            },
        }
    }
}

impl From<WorkerRef> for WorkerRefPayload {
    fn from(value: WorkerRef) -> Self {
        match value {
            WorkerRef::ById(id) => Self::Id(id.0),
            WorkerRef::ByRecord { worker_id, id } => Self::Object {
                worker_id: worker_id.map(|value| value.0),
                id: id.map(|value| value.0),
                employee_id: None,
            },
            WorkerRef::ByEmployeeId(employee_id) => Self::Object {
                worker_id: None,
                id: None,
                employee_id: Some(employee_id),
            },
        }
    }
}

/// Resolves a reference to a worker id. Employee ids are looked up in the store.
///
/// Returns `Ok(None)` when nothing usable was supplied or the employee id is unknown.
pub fn resolve_worker_id<S>(store: &S, reference: &WorkerRef) -> Result<Option<WorkerId>, StoreError>
where
    S: ComplianceStore + ?Sized,
{
    let candidate = match reference {
        WorkerRef::ById(id) => Some(id.clone()),
        WorkerRef::ByRecord { worker_id, id } => worker_id
            .iter()
            .chain(id.iter())
            .find(|value| !value.as_str().trim().is_empty())
            .cloned(),
        WorkerRef::ByEmployeeId(employee_id) => {
            let employee_id = employee_id.trim();
            if employee_id.is_empty() {
                None
            } else {
                store.worker_by_employee_id(employee_id)?.map(|worker| worker.id)
            }
        }
    };

    Ok(candidate.filter(|id| !id.as_str().trim().is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_bare_string_as_id() {
        let reference: WorkerRef = serde_json::from_str(r#""w-7""#).expect("parses");
        assert_eq!(reference, WorkerRef::ById(WorkerId::from("w-7")));
    }

    #[test]
    fn deserializes_object_shapes() {
        let by_worker_id: WorkerRef =
            serde_json::from_str(r#"{"workerId": "w-1", "id": "other"}"#).expect("parses");
        assert_eq!(
            by_worker_id,
            WorkerRef::ByRecord {
                worker_id: Some(WorkerId::from("w-1")),
                id: Some(WorkerId::from("other")),
            }
        );

        let by_employee: WorkerRef =
            serde_json::from_str(r#"{"employeeId": "E-42"}"#).expect("parses");
        assert_eq!(by_employee, WorkerRef::ByEmployeeId("E-42".to_string()));

        let empty: WorkerRef = serde_json::from_str("{}").expect("parses");
        assert_eq!(
            empty,
            WorkerRef::ByRecord {
                worker_id: None,
                id: None
            }
        );
    }
}
