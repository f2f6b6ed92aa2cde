//! Named, typed property tables.
//!
//! Every part owns one [`PropertyStore`]. Entries are stored values (optionally
//! read-only), computed getter/setter pairs with no backing value, or aliases
//! of other entries. Names are case-insensitive and aliases are resolved when
//! they are defined, so access never walks an alias chain.
//!
//! Writes notify in two phases: will-change observers run synchronously on the
//! writer's thread before the value changes, and a [`PropertyChange`] is then
//! queued for every subscriber, typically the presentation thread. Each
//! subscriber has its own unbounded queue, so a slow reader never loses a
//! change; the queues close when the store is dropped.

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;

use super::error::{ScriptError, ScriptResult};
use super::value::Value;

/// Getter for a computed property.
pub type Getter = Arc<dyn Fn(&PropertyStore) -> ScriptResult<Value> + Send + Sync>;

/// Setter for a computed property.
pub type Setter = Arc<dyn Fn(&PropertyStore, Value) -> ScriptResult<()> + Send + Sync>;

/// Receiving end of a property change subscription.
pub type ChangeReceiver = mpsc::UnboundedReceiver<PropertyChange>;

type WillChangeObserver = Arc<dyn Fn(&PropertyChange) + Send + Sync>;
type ObserverList = Mutex<Vec<(u64, WillChangeObserver)>>;

/// Qualifier selecting among related representations of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Adjective {
    /// `short name`, `short id`
    Short,
    /// `abbreviated name`, `abbreviated id`
    Abbreviated,
    /// `long name`, `long id`
    Long,
}

impl Adjective {
    /// Parse an adjective keyword (`short`, `abbr`, `abbrev`, `abbreviated`, `long`).
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword.to_ascii_lowercase().as_str() {
            "short" => Some(Adjective::Short),
            "abbr" | "abbrev" | "abbreviated" => Some(Adjective::Abbreviated),
            "long" => Some(Adjective::Long),
            _ => None,
        }
    }
}

impl fmt::Display for Adjective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Adjective::Short => "short",
            Adjective::Abbreviated => "abbreviated",
            Adjective::Long => "long",
        })
    }
}

/// A committed property write.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyChange {
    /// Canonical (lowercase) property name.
    pub property: String,
    /// Value before the write.
    pub old: Value,
    /// Value written.
    pub new: Value,
}

#[derive(Clone)]
enum PropertyEntry {
    Stored { value: Value, read_only: bool },
    Computed { getter: Getter, setter: Option<Setter> },
    Alias(String),
}

#[derive(Debug, Clone)]
struct AdjectiveForms {
    default: Adjective,
    short: String,
    abbreviated: String,
    long: String,
}

impl AdjectiveForms {
    fn key(&self, adjective: Adjective) -> &str {
        match adjective {
            Adjective::Short => &self.short,
            Adjective::Abbreviated => &self.abbreviated,
            Adjective::Long => &self.long,
        }
    }
}

/// Property table of a single part.
pub struct PropertyStore {
    label: String,
    entries: RwLock<HashMap<String, PropertyEntry>>,
    adjectives: RwLock<HashMap<String, AdjectiveForms>>,
    will_change: Arc<ObserverList>,
    next_observer: AtomicU64,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<PropertyChange>>>,
}

fn key(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

impl PropertyStore {
    /// Empty store; `label` names the owning part in error messages.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            entries: RwLock::new(HashMap::new()),
            adjectives: RwLock::new(HashMap::new()),
            will_change: Arc::new(Mutex::new(Vec::new())),
            next_observer: AtomicU64::new(0),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Label used for the owning part in error messages.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Define (or redefine) a stored property.
    pub fn define(&self, name: &str, initial: impl Into<Value>, read_only: bool) {
        self.entries.write().insert(
            key(name),
            PropertyEntry::Stored {
                value: initial.into(),
                read_only,
            },
        );
    }

    /// Define a computed property; without a setter it is read-only.
    pub fn define_computed(&self, name: &str, getter: Getter, setter: Option<Setter>) {
        self.entries
            .write()
            .insert(key(name), PropertyEntry::Computed { getter, setter });
    }

    /// Make `name` another spelling of `canonical`.
    pub fn alias(&self, name: &str, canonical: &str) -> ScriptResult<()> {
        let mut entries = self.entries.write();
        let target = match entries.get(&key(canonical)) {
            Some(PropertyEntry::Alias(target)) => target.clone(),
            Some(_) => key(canonical),
            None => return Err(self.unknown(canonical)),
        };
        entries.insert(key(name), PropertyEntry::Alias(target));
        Ok(())
    }

    /// Declare adjective forms for `base`: each adjective maps to the key of a
    /// concrete property, and `default` is used when no adjective is given.
    pub fn define_adjectives(
        &self,
        base: &str,
        default: Adjective,
        short: &str,
        abbreviated: &str,
        long: &str,
    ) {
        self.adjectives.write().insert(
            key(base),
            AdjectiveForms {
                default,
                short: key(short),
                abbreviated: key(abbreviated),
                long: key(long),
            },
        );
    }

    /// Concrete key for `name` qualified by `adjective`. Properties that declare
    /// no adjective forms map to their own name whatever the adjective.
    pub fn adjective_key(&self, name: &str, adjective: Option<Adjective>) -> String {
        let base = key(name);
        match self.adjectives.read().get(&base) {
            Some(forms) => forms.key(adjective.unwrap_or(forms.default)).to_string(),
            None => base,
        }
    }

    /// Whether `name` is defined.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().contains_key(&key(name))
    }

    /// Defined property names, sorted, aliases excluded.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries
            .read()
            .iter()
            .filter(|(_, entry)| !matches!(entry, PropertyEntry::Alias(_)))
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    fn unknown(&self, name: &str) -> ScriptError {
        ScriptError::UnknownProperty {
            part: self.label.clone(),
            property: name.to_string(),
        }
    }

    fn lookup(&self, name: &str) -> ScriptResult<(String, PropertyEntry)> {
        let entries = self.entries.read();
        let mut canonical = key(name);
        let mut entry = entries.get(&canonical).ok_or_else(|| self.unknown(name))?;
        if let PropertyEntry::Alias(target) = entry {
            canonical = target.clone();
            entry = entries.get(&canonical).ok_or_else(|| self.unknown(name))?;
        }
        Ok((canonical, entry.clone()))
    }

    /// Read a property. Unknown names fail, distinct from properties whose value is empty.
    pub fn get(&self, name: &str) -> ScriptResult<Value> {
        // The lock is released before a getter runs, so getters may read the store.
        match self.lookup(name)?.1 {
            PropertyEntry::Stored { value, .. } => Ok(value),
            PropertyEntry::Computed { getter, .. } => getter(self),
            PropertyEntry::Alias(_) => Err(self.unknown(name)),
        }
    }

    /// Read a property through an adjective form.
    pub fn get_with_adjective(&self, name: &str, adjective: Option<Adjective>) -> ScriptResult<Value> {
        self.get(&self.adjective_key(name, adjective))
    }

    /// Write a property.
    ///
    /// Read-only and getter-only properties reject the write without changing
    /// anything. Every accepted write notifies, even when the value is unchanged.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> ScriptResult<()> {
        let value = value.into();
        let (canonical, entry) = self.lookup(name)?;
        let setter = match entry {
            PropertyEntry::Stored { read_only: true, .. } => {
                tracing::debug!("rejected write to read-only property '{}' of {}", canonical, self.label);
                return Err(ScriptError::permission(canonical, "property is read-only"));
            }
            PropertyEntry::Computed { setter: None, .. } => {
                tracing::debug!("rejected write to getter-only property '{}' of {}", canonical, self.label);
                return Err(ScriptError::permission(canonical, "property cannot be set"));
            }
            PropertyEntry::Computed { setter: Some(setter), .. } => Some(setter),
            PropertyEntry::Stored { .. } => None,
            PropertyEntry::Alias(_) => return Err(self.unknown(name)),
        };

        let change = PropertyChange {
            property: canonical.clone(),
            old: self.get(&canonical)?,
            new: value.clone(),
        };
        self.notify_will_change(&change);

        match setter {
            Some(setter) => setter(self, value)?,
            None => {
                if let Some(PropertyEntry::Stored { value: slot, .. }) =
                    self.entries.write().get_mut(&canonical)
                {
                    *slot = value;
                }
            }
        }

        tracing::trace!("property '{}' of {} changed", canonical, self.label);
        self.publish(change);
        Ok(())
    }

    /// Write through an adjective-qualified name. Only the base form is writable,
    /// so any adjective is rejected.
    pub fn set_with_adjective(
        &self,
        name: &str,
        adjective: Option<Adjective>,
        value: impl Into<Value>,
    ) -> ScriptResult<()> {
        match adjective {
            Some(adjective) => Err(ScriptError::permission(
                format!("{} {}", adjective, key(name)),
                "only the base form of a property can be set",
            )),
            None => self.set(name, value),
        }
    }

    /// Overwrite a stored property even when it is read-only, without notifying.
    /// Used by the owning container for bookkeeping such as renumbering.
    pub fn restore(&self, name: &str, value: impl Into<Value>) -> ScriptResult<()> {
        let canonical = self.lookup(name)?.0;
        match self.entries.write().get_mut(&canonical) {
            Some(PropertyEntry::Stored { value: slot, .. }) => {
                *slot = value.into();
                Ok(())
            }
            _ => Err(ScriptError::permission(canonical, "property has no stored value")),
        }
    }

    /// Receive every committed change from now on. The receiver sees the
    /// channel close when the store is dropped.
    pub fn subscribe(&self) -> ChangeReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        rx
    }

    fn publish(&self, change: PropertyChange) {
        let mut subscribers = self.subscribers.lock();
        // Dropped receivers are unregistered on the next change.
        subscribers.retain(|tx| tx.send(change.clone()).is_ok());
    }

    /// Run `observer` synchronously before each write. The observer stays
    /// registered for as long as the returned guard lives.
    pub fn observe_will_change<F>(&self, observer: F) -> WillChangeGuard
    where
        F: Fn(&PropertyChange) + Send + Sync + 'static,
    {
        let id = self.next_observer.fetch_add(1, Ordering::Relaxed);
        self.will_change.lock().push((id, Arc::new(observer)));
        WillChangeGuard {
            observers: Arc::downgrade(&self.will_change),
            id,
        }
    }

    fn notify_will_change(&self, change: &PropertyChange) {
        let observers: Vec<WillChangeObserver> = self
            .will_change
            .lock()
            .iter()
            .map(|(_, observer)| observer.clone())
            .collect();
        for observer in observers {
            observer(change);
        }
    }
}

impl fmt::Debug for PropertyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyStore")
            .field("label", &self.label)
            .field("properties", &self.names())
            .finish()
    }
}

/// Registration handle for a will-change observer; dropping it unregisters.
pub struct WillChangeGuard {
    observers: Weak<ObserverList>,
    id: u64,
}

impl Drop for WillChangeGuard {
    fn drop(&mut self) {
        if let Some(observers) = self.observers.upgrade() {
            observers.lock().retain(|(id, _)| *id != self.id);
        }
    }
}
