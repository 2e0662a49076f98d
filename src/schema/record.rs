//! Schemas for struct-like states.
//!
//! Where [`MapState`](super::MapState) is too loose, callers bring their
//! own state struct and describe its merge behavior either with one custom
//! function or field by field via [`FieldRule`] combinators.

use std::sync::Arc;

use super::{SchemaError, StateSchema};

/// Caller-supplied whole-state merge function.
pub type MergeFn<S> = Arc<dyn Fn(S, S) -> S + Send + Sync>;

/// Merges one field of the update into the accumulating result.
///
/// Rules run in registration order against the state produced by the
/// previous rule, starting from the current state.
pub type FieldRule<S> = Arc<dyn Fn(&mut S, &S) + Send + Sync>;

enum MergeStrategy<S> {
    /// Whole-state merge: `merge(current, update) -> next`.
    Custom(MergeFn<S>),
    /// Ordered per-field rules applied on top of the current state.
    Fields(Vec<FieldRule<S>>),
}

impl<S> Clone for MergeStrategy<S> {
    fn clone(&self) -> Self {
        match self {
            Self::Custom(f) => Self::Custom(Arc::clone(f)),
            Self::Fields(rules) => Self::Fields(rules.clone()),
        }
    }
}

/// Schema for a caller-defined state struct.
///
/// # Examples
///
/// ```rust
/// use stepgraph::schema::{field, RecordSchema, StateSchema};
///
/// #[derive(Clone, Debug, Default)]
/// struct Tally {
///     count: i64,
///     log: Vec<String>,
/// }
///
/// let schema = RecordSchema::new(Tally::default())
///     .field(field::sum_i64(|s: &Tally| s.count, |s| &mut s.count))
///     .field(field::append(|s: &Tally| &s.log, |s| &mut s.log));
///
/// let next = schema
///     .apply(
///         Tally { count: 1, log: vec!["a".into()] },
///         Tally { count: 2, log: vec!["b".into()] },
///     )
///     .unwrap();
/// assert_eq!(next.count, 3);
/// assert_eq!(next.log, vec!["a".to_string(), "b".to_string()]);
/// ```
pub struct RecordSchema<S> {
    initial: S,
    strategy: MergeStrategy<S>,
}

impl<S: Clone + Send + Sync> RecordSchema<S> {
    /// Schema with no rules yet; updates replace the state until a merge
    /// function or field rules are attached.
    #[must_use]
    pub fn new(initial: S) -> Self {
        Self {
            initial,
            strategy: MergeStrategy::Fields(Vec::new()),
        }
    }

    /// Use a single whole-state merge function.
    #[must_use]
    pub fn merge_with(mut self, merge: impl Fn(S, S) -> S + Send + Sync + 'static) -> Self {
        self.strategy = MergeStrategy::Custom(Arc::new(merge));
        self
    }

    /// Append a per-field merge rule. See the [`field`] combinators.
    #[must_use]
    pub fn field(mut self, rule: FieldRule<S>) -> Self {
        match &mut self.strategy {
            MergeStrategy::Fields(rules) => rules.push(rule),
            MergeStrategy::Custom(_) => {
                self.strategy = MergeStrategy::Fields(vec![rule]);
            }
        }
        self
    }
}

impl<S: Clone + Send + Sync> StateSchema<S> for RecordSchema<S> {
    fn init(&self) -> S {
        self.initial.clone()
    }

    fn apply(&self, current: S, update: S) -> Result<S, SchemaError> {
        match &self.strategy {
            MergeStrategy::Custom(merge) => Ok(merge(current, update)),
            MergeStrategy::Fields(rules) if rules.is_empty() => Ok(update),
            MergeStrategy::Fields(rules) => {
                let mut next = current;
                for rule in rules {
                    rule(&mut next, &update);
                }
                Ok(next)
            }
        }
    }
}

/// Per-field merge combinators for [`RecordSchema`].
///
/// Each combinator takes accessor closures for one field and yields a
/// [`FieldRule`]. Accessors keep the rules free of any reflection: the
/// schema stays a plain list of closures over the caller's struct.
pub mod field {
    use super::FieldRule;
    use std::sync::Arc;

    /// Append the update's elements to the current sequence.
    pub fn append<S, T, R, W>(read: R, write: W) -> FieldRule<S>
    where
        T: Clone + Send + Sync + 'static,
        R: Fn(&S) -> &Vec<T> + Send + Sync + 'static,
        W: Fn(&mut S) -> &mut Vec<T> + Send + Sync + 'static,
    {
        Arc::new(move |out, update| {
            let items = read(update).clone();
            write(out).extend(items);
        })
    }

    /// Add the update's integer field into the current one.
    pub fn sum_i64<S, R, W>(read: R, write: W) -> FieldRule<S>
    where
        R: Fn(&S) -> i64 + Send + Sync + 'static,
        W: Fn(&mut S) -> &mut i64 + Send + Sync + 'static,
    {
        Arc::new(move |out, update| {
            *write(out) += read(update);
        })
    }

    /// Overwrite with the update's value unless it equals the default.
    ///
    /// This preserves the current value when the update left the field
    /// untouched, mirroring "non-zero fields win" struct merging.
    pub fn overwrite<S, T, R, W>(read: R, write: W) -> FieldRule<S>
    where
        T: Clone + Default + PartialEq + Send + Sync + 'static,
        R: Fn(&S) -> &T + Send + Sync + 'static,
        W: Fn(&mut S) -> &mut T + Send + Sync + 'static,
    {
        Arc::new(move |out, update| {
            let incoming = read(update);
            if *incoming != T::default() {
                *write(out) = incoming.clone();
            }
        })
    }

    /// Ignore the update for this field.
    pub fn keep_current<S>() -> FieldRule<S> {
        Arc::new(|_out, _update| {})
    }

    /// Keep the larger value.
    pub fn max_of<S, T, R, W>(read: R, write: W) -> FieldRule<S>
    where
        T: Clone + PartialOrd + Send + Sync + 'static,
        R: Fn(&S) -> &T + Send + Sync + 'static,
        W: Fn(&mut S) -> &mut T + Send + Sync + 'static,
    {
        Arc::new(move |out, update| {
            let incoming = read(update).clone();
            let slot = write(out);
            if incoming > *slot {
                *slot = incoming;
            }
        })
    }

    /// Keep the smaller value.
    pub fn min_of<S, T, R, W>(read: R, write: W) -> FieldRule<S>
    where
        T: Clone + PartialOrd + Send + Sync + 'static,
        R: Fn(&S) -> &T + Send + Sync + 'static,
        W: Fn(&mut S) -> &mut T + Send + Sync + 'static,
    {
        Arc::new(move |out, update| {
            let incoming = read(update).clone();
            let slot = write(out);
            if incoming < *slot {
                *slot = incoming;
            }
        })
    }
}
