//! Scenario files and running them.

pub use self::script::*;

use {
    hailstone_core::{
        CrankOutcome, Kernel, KernelConfig, KernelError, Kref, Vref,
        delivery::CapData,
        state::KernelDump,
        syscall::VatSyscall,
    },
    serde::{Deserialize, Serialize},
    std::io::Read,
    thiserror::Error,
    tracing::{debug, info},
};

mod script;

/// Error while loading or running a scenario.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum ScenarioError
{
    #[error("Vat `{vat}` has an invalid method pattern `{pattern}`: {source}")]
    Regex{vat: String, pattern: String, source: regex::Error},

    #[error("Vat `{vat}` has no reference `{vref}`")]
    UnknownRef{vat: String, vref: Vref},

    #[error("{0}")]
    Kernel(#[from] KernelError),
}

/// Vats and the steps to run against them.
#[allow(missing_docs)]
#[derive(Clone, Debug, Deserialize)]
pub struct Scenario
{
    #[serde(default)]
    pub config: KernelConfig,
    pub vats: Vec<VatSpec>,
    pub steps: Vec<Step>,
}

/// A vat in a scenario.
#[derive(Clone, Debug, Deserialize)]
pub struct VatSpec
{
    /// Name the vat is registered under.
    pub name: String,

    /// Objects registered for the vat up front.
    ///
    /// The host pins these, so they are not collected until unpinned.
    #[serde(default)]
    pub exports: Vec<Vref>,

    /// How the vat reacts to deliveries.
    #[serde(default)]
    pub rules: Vec<Rule>,
}

/// Reaction of a scripted vat to a delivery.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule
{
    /// Which deliveries the rule applies to.
    pub on: Trigger,

    /// Syscalls to make, in order.
    #[serde(default)]
    pub syscalls: Vec<VatSyscall>,

    /// On `dropExports`, retire the dropped exports right away,
    /// as a vat that keeps no local references would.
    #[serde(default)]
    pub retire_delivered: bool,

    /// On a message with a result promise, resolve it.
    #[serde(default)]
    pub resolve_result: Option<Answer>,

    /// Fail the delivery with this reason instead of doing anything.
    #[serde(default)]
    pub fail: Option<String>,
}

/// Resolution of a message's result promise.
#[allow(missing_docs)]
#[derive(Clone, Debug, Deserialize)]
pub struct Answer
{
    #[serde(default)]
    pub rejected: bool,
    pub data: CapData<Vref>,
}

/// Kind of delivery a rule applies to.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum Trigger
{
    /// Messages, optionally only those whose method matches a regex.
    Message{#[serde(default)] method: Option<String>},

    #[allow(missing_docs)]
    Notify,

    #[allow(missing_docs)]
    DropExports,

    #[allow(missing_docs)]
    RetireExports,

    #[allow(missing_docs)]
    RetireImports,
}

impl Trigger
{
    /// The delivery kind, as returned by [`VatDelivery::kind`].
    ///
    /// [`VatDelivery::kind`]: `hailstone_core::delivery::VatDelivery::kind`
    pub fn kind(&self) -> &'static str
    {
        match self {
            Self::Message{..}   => "message",
            Self::Notify        => "notify",
            Self::DropExports   => "dropExports",
            Self::RetireExports => "retireExports",
            Self::RetireImports => "retireImports",
        }
    }
}

/// How the host names a kref.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum HostRef
{
    /// The kref itself, such as the result promise of an earlier step.
    Kref(Kref),

    /// A reference in the c-list of a vat.
    ///
    /// An object export the vat has not mentioned yet is registered.
    Vat{vat: String, vref: Vref},
}

/// Something the host does.
#[allow(missing_docs)]
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum Step
{
    /// Send a message, optionally with a result promise the host pins.
    Queue{
        target: HostRef,
        method: String,
        #[serde(default = "no_args")]
        args: CapData<HostRef>,
        #[serde(default)]
        result: bool,
    },

    /// Run a single crank.
    #[serde(rename = "step")]
    Crank,

    /// Run cranks until there is nothing left to do.
    Run,

    /// Release a pin taken by the host.
    Unpin{target: HostRef},

    /// Terminate a vat.
    Terminate{
        vat: String,
        #[serde(default = "default_reason")]
        reason: String,
    },

    /// Record the kernel tables in the report.
    Dump,
}

fn no_args() -> CapData<HostRef>
{
    CapData::new("[]", [])
}

fn default_reason() -> String
{
    "terminated by host".to_owned()
}

/// What running a scenario produced.
#[derive(Debug, Default, Serialize)]
pub struct Report
{
    /// Entries in the order they happened.
    pub entries: Vec<Entry>,
}

/// Entry of a [`Report`].
#[allow(missing_docs)]
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum Entry
{
    Crank{number: u64, outcome: CrankOutcome},
    Queued{target: Kref, method: String, result: Option<Kref>},
    Dump{dump: KernelDump},
}

impl Report
{
    /// Outcomes of all cranks, in order.
    pub fn outcomes(&self) -> impl Iterator<Item=&CrankOutcome>
    {
        self.entries.iter().filter_map(|entry| match entry {
            Entry::Crank{outcome, ..} => Some(outcome),
            _ => None,
        })
    }

    /// The most recent dump.
    pub fn last_dump(&self) -> Option<&KernelDump>
    {
        self.entries.iter().rev().find_map(|entry| match entry {
            Entry::Dump{dump} => Some(dump),
            _ => None,
        })
    }
}

impl Scenario
{
    /// Read a scenario from JSON.
    pub fn from_reader<R>(reader: R) -> serde_json::Result<Self>
        where R: Read
    {
        serde_json::from_reader(reader)
    }

    /// Set up the vats and run every step.
    pub fn run(self) -> Result<Report, ScenarioError>
    {
        let mut driver = Driver{
            kernel: Kernel::new(self.config),
            report: Report::default(),
        };

        for spec in &self.vats {
            let vat = ScriptedVat::new(spec)?;
            let id = driver.kernel.add_vat(&spec.name, Box::new(vat))?;
            for &vref in &spec.exports {
                let kref = driver.kernel.add_export(id, vref)?;
                driver.kernel.pin(kref)?;
            }
        }

        for step in self.steps {
            driver.apply(step)?;
        }

        Ok(driver.report)
    }
}

struct Driver
{
    kernel: Kernel,
    report: Report,
}

impl Driver
{
    fn apply(&mut self, step: Step) -> Result<(), ScenarioError>
    {
        debug!(step = ?step, "host step");
        match step {
            Step::Queue{target, method, args, result} => {
                let target = self.resolve(&target)?;
                let args = args.map_slots(|slot| self.resolve(slot))?;
                let result = self.kernel.queue_to_kref(target, &method, args, result)?;
                self.report.entries.push(Entry::Queued{target, method, result});
            },
            Step::Crank => {
                self.crank()?;
            },
            Step::Run => {
                let before = self.kernel.cranks();
                while self.crank()? {}
                info!(cranks = self.kernel.cranks() - before, "ran until idle");
            },
            Step::Unpin{target} => {
                let target = self.resolve(&target)?;
                self.kernel.unpin(target)?;
            },
            Step::Terminate{vat, reason} => {
                let vat = self.kernel.vat_id(&vat)?;
                self.kernel.terminate_vat(vat, &reason)?;
            },
            Step::Dump => {
                let dump = self.kernel.dump();
                self.report.entries.push(Entry::Dump{dump});
            },
        }
        Ok(())
    }

    /// Run one crank; returns whether there was one.
    fn crank(&mut self) -> Result<bool, ScenarioError>
    {
        match self.kernel.step()? {
            Some(outcome) => {
                let number = self.kernel.cranks();
                self.report.entries.push(Entry::Crank{number, outcome});
                Ok(true)
            },
            None => Ok(false),
        }
    }

    fn resolve(&mut self, host: &HostRef) -> Result<Kref, ScenarioError>
    {
        let (name, vref) = match host {
            HostRef::Kref(kref) => return Ok(*kref),
            HostRef::Vat{vat, vref} => (vat, *vref),
        };
        let vat = self.kernel.vat_id(name)?;
        if let Some(kref) = self.kernel.kref(vat, vref) {
            return Ok(kref);
        }
        if vref.is_object() && vref.is_export() {
            return Ok(self.kernel.add_export(vat, vref)?);
        }
        Err(ScenarioError::UnknownRef{vat: name.clone(), vref})
    }
}

#[cfg(test)]
mod tests
{
    use {
        super::*,
        hailstone_core::{Kref, VatId, delivery::VatDelivery, state::PromiseStatus},
    };

    const DEMO: &str = include_str!("../../../demos/drop-and-retire.json");

    fn run(json: &str) -> Report
    {
        let mut scenario = Scenario::from_reader(json.as_bytes()).unwrap();
        scenario.config.audit_every_crank = true;
        scenario.run().unwrap()
    }

    fn delivered(report: &Report, vat: VatId) -> Vec<&VatDelivery>
    {
        report.outcomes()
            .filter_map(|outcome| match outcome {
                CrankOutcome::Delivered{vat: v, delivery, ..} if *v == vat =>
                    Some(delivery),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn demo()
    {
        let report = run(DEMO);
        let (alice, bob) = (VatId(1), VatId(2));

        let kinds: Vec<_> = delivered(&report, bob).iter().map(|d| d.kind()).collect();
        assert_eq!(kinds, ["message", "dropExports"]);
        let kinds: Vec<_> = delivered(&report, alice).iter().map(|d| d.kind()).collect();
        assert_eq!(kinds, ["message", "message", "retireImports"]);

        // Only the pinned roots remain.
        let dump = report.last_dump().unwrap();
        let objects: Vec<Kref> = dump.objects.iter().map(|o| o.kref).collect();
        assert_eq!(objects, [Kref::object(20), Kref::object(21)]);
        assert!(dump.promises.is_empty());
        assert!(dump.gc_actions.is_empty());
    }

    #[test]
    fn failing_vat_is_terminated()
    {
        let report = run(r#"{
            "vats": [
                {"name": "alice", "exports": ["o+0"],
                 "rules": [{"on": {"type": "message"}, "fail": "no thanks"}]}
            ],
            "steps": [
                {"type": "queue", "target": {"vat": "alice", "vref": "o+0"},
                 "method": "hello", "result": true},
                {"type": "run"},
                {"type": "dump"}
            ]
        }"#);

        let outcome = report.outcomes().next().unwrap();
        assert!(matches!(
            outcome,
            CrankOutcome::Terminated{reason, ..} if reason.contains("no thanks"),
        ));

        let dump = report.last_dump().unwrap();
        assert_eq!(dump.terminated, [VatId(1)]);
        assert_eq!(dump.promise(Kref::promise(40)).unwrap().status,
                   PromiseStatus::Rejected);
    }

    #[test]
    fn unknown_reference()
    {
        let scenario = Scenario::from_reader(&br#"{
            "vats": [{"name": "alice"}],
            "steps": [
                {"type": "queue", "target": {"vat": "alice", "vref": "o-50"},
                 "method": "hello"}
            ]
        }"#[..]).unwrap();
        assert!(matches!(
            scenario.run(),
            Err(ScenarioError::UnknownRef{vat, ..}) if vat == "alice",
        ));
    }

    #[test]
    fn unknown_vat()
    {
        let scenario = Scenario::from_reader(&br#"{
            "vats": [],
            "steps": [{"type": "terminate", "vat": "mallory"}]
        }"#[..]).unwrap();
        assert!(matches!(
            scenario.run(),
            Err(ScenarioError::Kernel(KernelError::UnknownVatName(name))) if name == "mallory",
        ));
    }
}
