//! Scheduling drop and retire notifications.
//!
//! When the counters of an object fall, the kernel schedules
//! [GC actions][`GcAction`] telling the vats involved.
//! Actions are kept in a deduplicated set and delivered one per crank,
//! in `(vat, kind, kref)` order, once the run-queue is empty.
//! Vat and kref ids compare as numbers, so `v2` comes before `v10`.
//! An action whose precondition no longer holds when it comes up
//! is discarded without delivery; this is called negation.

use {
    crate::kref::{Kref, VatId},
    serde::{Deserialize, Deserializer, Serialize, Serializer, de},
    std::{collections::BTreeSet, fmt, str::FromStr},
    thiserror::Error,
};

mod process;

/// What a GC action tells the vat.
///
/// The declaration order is the delivery order among actions
/// for the same vat.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum GcActionKind
{
    /// Nobody can reach the vat's export any more.
    DropExport,

    /// Nobody can recognize the vat's export any more.
    RetireExport,

    /// The exporter of the vat's import retired it.
    RetireImport,
}

impl GcActionKind
{
    fn name(self) -> &'static str
    {
        match self {
            Self::DropExport   => "dropExport",
            Self::RetireExport => "retireExport",
            Self::RetireImport => "retireImport",
        }
    }
}

/// Scheduled notification to a vat.
#[allow(missing_docs)]
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct GcAction
{
    pub vat: VatId,
    pub kind: GcActionKind,
    pub kref: Kref,
}

impl fmt::Display for GcAction
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        write!(f, "{} {} {}", self.vat, self.kind.name(), self.kref)
    }
}

impl fmt::Debug for GcAction
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        fmt::Display::fmt(self, f)
    }
}

/// Error returned when parsing a GC action.
#[derive(Debug, Error)]
#[error("Malformed GC action: `{0}`")]
pub struct ParseGcActionError(String);

impl FromStr for GcAction
{
    type Err = ParseGcActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        let error = || ParseGcActionError(s.to_owned());
        let mut words = s.split(' ');
        let vat = words.next().and_then(|w| w.parse().ok()).ok_or_else(error)?;
        let kind = match words.next() {
            Some("dropExport")   => GcActionKind::DropExport,
            Some("retireExport") => GcActionKind::RetireExport,
            Some("retireImport") => GcActionKind::RetireImport,
            _ => return Err(error()),
        };
        let kref = words.next().and_then(|w| w.parse().ok()).ok_or_else(error)?;
        if words.next().is_some() {
            return Err(error());
        }
        Ok(Self{vat, kind, kref})
    }
}

impl Serialize for GcAction
{
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
        where S: Serializer
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for GcAction
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
        where D: Deserializer<'de>
    {
        let string = String::deserialize(deserializer)?;
        string.parse().map_err(de::Error::custom)
    }
}

/// Pending GC actions.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(transparent)]
pub struct GcActionSet(BTreeSet<GcAction>);

impl GcActionSet
{
    /// Schedule an action; scheduling it twice has no further effect.
    pub fn insert(&mut self, action: GcAction) -> bool
    {
        self.0.insert(action)
    }

    /// Take the action that comes first in delivery order.
    pub fn pop_first(&mut self) -> Option<GcAction>
    {
        self.0.pop_first()
    }

    /// Discard every action addressed to the vat.
    pub fn remove_vat(&mut self, vat: VatId)
    {
        self.0.retain(|a| a.vat != vat);
    }

    #[allow(missing_docs)]
    pub fn contains(&self, action: &GcAction) -> bool
    {
        self.0.contains(action)
    }

    /// Pending actions, in delivery order.
    pub fn iter(&self) -> impl Iterator<Item=&GcAction>
    {
        self.0.iter()
    }

    #[allow(missing_docs)]
    pub fn len(&self) -> usize
    {
        self.0.len()
    }

    #[allow(missing_docs)]
    pub fn is_empty(&self) -> bool
    {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn action(s: &str) -> GcAction
    {
        s.parse().unwrap()
    }

    #[test]
    fn delivery_order()
    {
        let mut set = GcActionSet::default();
        set.insert(action("v2 dropExport ko20"));
        set.insert(action("v1 retireImport ko20"));
        set.insert(action("v1 retireExport ko22"));
        set.insert(action("v1 dropExport ko23"));
        set.insert(action("v1 dropExport ko22"));
        assert!(!set.insert(action("v1 dropExport ko22")));

        let order: Vec<_> = std::iter::from_fn(|| set.pop_first())
            .map(|a| a.to_string())
            .collect();
        assert_eq!(order, [
            "v1 dropExport ko22",
            "v1 dropExport ko23",
            "v1 retireExport ko22",
            "v1 retireImport ko20",
            "v2 dropExport ko20",
        ]);
    }

    #[test]
    fn ids_compare_as_numbers()
    {
        let mut set = GcActionSet::default();
        set.insert(action("v10 dropExport ko20"));
        set.insert(action("v2 dropExport ko100"));
        set.insert(action("v2 dropExport ko22"));

        let order: Vec<_> = set.iter().map(|a| a.to_string()).collect();
        assert_eq!(order, [
            "v2 dropExport ko22",
            "v2 dropExport ko100",
            "v10 dropExport ko20",
        ]);
    }

    #[test]
    fn remove_vat()
    {
        let mut set = GcActionSet::default();
        set.insert(action("v1 dropExport ko20"));
        set.insert(action("v2 retireImport ko20"));
        set.remove_vat(VatId(2));
        assert_eq!(set.len(), 1);
        assert!(set.contains(&action("v1 dropExport ko20")));
    }

    #[test]
    fn parse_rejects_garbage()
    {
        for bad in ["", "v1", "v1 dropExport", "v1 dropImport ko20",
                    "v1 dropExport ko20 x", "ko20 dropExport v1"] {
            assert!(bad.parse::<GcAction>().is_err(), "{bad:?}");
        }
    }

    #[test]
    fn json_is_list_of_strings()
    {
        let mut set = GcActionSet::default();
        set.insert(action("v1 dropExport ko20"));
        assert_eq!(serde_json::to_string(&set).unwrap(),
                   r#"["v1 dropExport ko20"]"#);
    }
}
