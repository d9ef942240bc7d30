use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("{kind}")]
pub struct DatabaseError {
    pub kind: DatabaseErrorKind,
}

#[derive(Debug, Clone, Error)]
pub enum DatabaseErrorKind {
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    #[error("duplicate {entity}: {id}")]
    Duplicate { entity: String, id: String },

    #[error("connection error: {message}")]
    Connection { message: String },

    #[error("query error: {message}")]
    Query { message: String },

    #[error("database error: {message}")]
    Unknown { message: String },
}

impl DatabaseError {
    pub fn new(kind: DatabaseErrorKind) -> Self {
        Self { kind }
    }

    pub fn not_found(entity: &str, id: &str) -> Self {
        Self::new(DatabaseErrorKind::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        })
    }

    pub fn from_sqlx(err: sqlx::Error) -> Self {
        let kind = match &err {
            sqlx::Error::RowNotFound => DatabaseErrorKind::NotFound {
                entity: "row".to_string(),
                id: String::new(),
            },
            sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
                DatabaseErrorKind::Duplicate {
                    entity: db.table().unwrap_or("row").to_string(),
                    id: db.constraint().unwrap_or("unique").to_string(),
                }
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                DatabaseErrorKind::Connection {
                    message: err.to_string(),
                }
            }
            _ => DatabaseErrorKind::Query {
                message: err.to_string(),
            },
        };
        Self::new(kind)
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, DatabaseErrorKind::Connection { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.kind, DatabaseErrorKind::NotFound { .. })
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self.kind, DatabaseErrorKind::Duplicate { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_errors_are_retryable() {
        let err = DatabaseError::new(DatabaseErrorKind::Connection {
            message: "pool timed out".to_string(),
        });
        assert!(err.is_retryable());
        assert!(!err.is_not_found());
    }

    #[test]
    fn not_found_carries_entity_and_id() {
        let err = DatabaseError::not_found("PaymentRecord", "ORD-100-1");
        assert!(err.is_not_found());
        assert!(err.to_string().contains("PaymentRecord"));
        assert!(err.to_string().contains("ORD-100-1"));
    }
}
