//! Messages, resolutions, and deliveries.
//!
//! These types are generic over the slot type:
//! inside the kernel slots are [`Kref`]s,
//! at the vat boundary they are [`Vref`]s.

use {
    crate::kref::{Kref, Vref},
    serde::{Deserialize, Serialize},
    smallvec::SmallVec,
};

/// Slots of capability data.
///
/// Most messages mention at most a couple of references.
pub type Slots<S> = SmallVec<[S; 2]>;

/// Capability data: an opaque body plus the references it mentions.
///
/// The kernel never interprets the body,
/// except to recognize a single-presence body (see [`presence`]).
///
/// [`presence`]: `CapData::presence`
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct CapData<S>
{
    /// Serialized value, with slot references by index.
    pub body: String,

    /// References mentioned by the body.
    pub slots: Slots<S>,
}

/// Body of a value that is nothing but a reference to slot 0.
const PRESENCE_BODY: &str = r#"{"@qclass":"slot","index":0}"#;

#[derive(Deserialize)]
struct SlotBody
{
    #[serde(rename = "@qclass")]
    qclass: String,
    index: usize,
}

impl<S> CapData<S>
{
    #[allow(missing_docs)]
    pub fn new<I>(body: impl Into<String>, slots: I) -> Self
        where I: IntoIterator<Item=S>
    {
        Self{body: body.into(), slots: slots.into_iter().collect()}
    }

    /// Capability data that is just the given reference.
    pub fn presence_of(slot: S) -> Self
    {
        Self::new(PRESENCE_BODY, [slot])
    }

    /// Capability data describing an error, for synthesized rejections.
    pub fn error(message: &str) -> Self
    {
        let body = serde_json::json!({
            "@qclass": "error",
            "name": "Error",
            "message": message,
        });
        Self::new(body.to_string(), [])
    }

    /// If the value is exactly one reference, that reference.
    pub fn presence(&self) -> Option<&S>
    {
        if self.slots.len() != 1 {
            return None;
        }
        let body: SlotBody = serde_json::from_str(&self.body).ok()?;
        (body.qclass == "slot" && body.index == 0).then(|| &self.slots[0])
    }

    /// Translate each slot, keeping the body.
    pub fn map_slots<T, E, F>(&self, mut f: F)
        -> Result<CapData<T>, E>
        where F: FnMut(&S) -> Result<T, E>
    {
        let slots = self.slots.iter().map(&mut f).collect::<Result<_, E>>()?;
        Ok(CapData{body: self.body.clone(), slots})
    }
}

/// Asynchronous message sent to an object or promise.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Message<S>
{
    /// Name of the method to invoke.
    pub method: String,

    /// Arguments of the method.
    pub args: CapData<S>,

    /// Promise for the result of the method, if the sender wants one.
    pub result: Option<S>,
}

impl<S> Message<S>
{
    #[allow(missing_docs)]
    pub fn new(method: impl Into<String>, args: CapData<S>) -> Self
    {
        Self{method: method.into(), args, result: None}
    }

    /// The same message, with a result promise.
    pub fn with_result(self, result: S) -> Self
    {
        Self{result: Some(result), ..self}
    }

    /// Every reference mentioned by the message, except its target.
    pub fn references(&self) -> impl Iterator<Item=&S>
    {
        self.args.slots.iter().chain(&self.result)
    }
}

/// Final state of a promise.
#[allow(missing_docs)]
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Resolution<S>
{
    pub promise: S,
    pub rejected: bool,
    pub data: CapData<S>,
}

/// Unit of work handed to a vat.
#[allow(missing_docs)]
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum VatDelivery
{
    /// Invoke a method on one of the vat's objects.
    Message{target: Vref, message: Message<Vref>},

    /// Promises the vat subscribed to were resolved.
    Notify{resolutions: Vec<Resolution<Vref>>},

    /// Nobody can reach these exports any more.
    DropExports{vrefs: Vec<Vref>},

    /// Nobody can recognize these exports any more.
    RetireExports{vrefs: Vec<Vref>},

    /// The exporters of these imports retired them.
    RetireImports{vrefs: Vec<Vref>},
}

impl VatDelivery
{
    /// Short name of the delivery kind, as used in logs.
    pub fn kind(&self) -> &'static str
    {
        match self {
            Self::Message{..}       => "message",
            Self::Notify{..}        => "notify",
            Self::DropExports{..}   => "dropExports",
            Self::RetireExports{..} => "retireExports",
            Self::RetireImports{..} => "retireImports",
        }
    }
}

/// Message as held by the kernel.
pub type KernelMessage = Message<Kref>;
