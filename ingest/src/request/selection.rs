//! Data selection requested by a filter.
//!
//! Selections only describe the optional fields. Fields needed to assemble
//! blocks (indices, addresses, hashes) are always fetched, see
//! [crate::gateway::models::FieldSelection].

field_flags! {
    /// Optional transaction fields.
    pub struct TransactionRequest {
        pub source,
        pub gas,
        pub gas_price,
        pub hash,
        pub input,
        pub nonce,
        pub value,
        pub kind,
        pub chain_id,
        pub v,
        pub r,
        pub s,
    }
}

/// Optional log fields, including the fields of the transaction that emitted the log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogRequest {
    pub data: bool,
    pub removed: bool,
    pub topics: bool,
    pub transaction: Option<TransactionRequest>,
}

impl LogRequest {
    /// Select all log fields and the full parent transaction.
    pub fn all() -> Self {
        Self {
            data: true,
            removed: true,
            topics: true,
            transaction: Some(TransactionRequest::all()),
        }
    }

    /// Returns the field-by-field union of the two requests.
    ///
    /// The nested transaction selection is merged with [union_option].
    pub fn union(&self, other: &Self) -> Self {
        Self {
            data: self.data || other.data,
            removed: self.removed || other.removed,
            topics: self.topics || other.topics,
            transaction: union_option(
                self.transaction.as_ref(),
                other.transaction.as_ref(),
                TransactionRequest::union,
            ),
        }
    }
}

/// Union two optional selections with `union`.
///
/// A selection that is present on either side stays present.
pub fn union_option<T: Clone>(
    a: Option<&T>,
    b: Option<&T>,
    union: impl FnOnce(&T, &T) -> T,
) -> Option<T> {
    match (a, b) {
        (None, None) => None,
        (Some(a), None) => Some(a.clone()),
        (None, Some(b)) => Some(b.clone()),
        (Some(a), Some(b)) => Some(union(a, b)),
    }
}

#[cfg(test)]
mod tests {
    use super::{union_option, LogRequest, TransactionRequest};

    #[test]
    pub fn test_transaction_union() {
        let a = TransactionRequest {
            gas: true,
            ..Default::default()
        };
        let b = TransactionRequest {
            hash: true,
            ..Default::default()
        };

        let merged = a.union(&b);
        assert!(merged.gas);
        assert!(merged.hash);
        assert!(!merged.input);

        assert!(TransactionRequest::default().is_empty());
        assert!(!merged.is_empty());
    }

    #[test]
    pub fn test_log_union_is_recursive() {
        let a = LogRequest {
            topics: true,
            transaction: Some(TransactionRequest {
                gas: true,
                ..Default::default()
            }),
            ..Default::default()
        };
        let b = LogRequest {
            data: true,
            transaction: Some(TransactionRequest {
                hash: true,
                ..Default::default()
            }),
            ..Default::default()
        };

        let merged = a.union(&b);
        assert!(merged.topics);
        assert!(merged.data);
        assert!(!merged.removed);

        let tx = merged.transaction.unwrap();
        assert!(tx.gas);
        assert!(tx.hash);
        assert!(!tx.value);
    }

    #[test]
    pub fn test_union_is_idempotent() {
        let request = LogRequest {
            data: true,
            transaction: Some(TransactionRequest {
                input: true,
                ..Default::default()
            }),
            ..Default::default()
        };

        assert_eq!(request.union(&request), request);
        assert_eq!(LogRequest::all().union(&request), LogRequest::all());
    }

    #[test]
    pub fn test_union_option() {
        let tx = TransactionRequest {
            r: true,
            ..Default::default()
        };

        let hash = TransactionRequest {
            hash: true,
            ..Default::default()
        };

        assert_eq!(union_option(None, None, TransactionRequest::union), None);
        assert_eq!(union_option(Some(&tx), None, TransactionRequest::union), Some(tx));
        assert_eq!(union_option(None, Some(&tx), TransactionRequest::union), Some(tx));
        assert_eq!(
            union_option(Some(&tx), Some(&hash), TransactionRequest::union),
            Some(tx.union(&hash))
        );
    }
}
