use {
    super::{Rule, ScenarioError, Trigger, VatSpec},
    hailstone_core::{
        VatFailure,
        delivery::{Message, Resolution, VatDelivery},
        syscall::Syscalls,
        vat::Vat,
    },
    regex::Regex,
    tracing::trace,
};

/// Vat whose reactions are given by rules.
///
/// On each delivery the first rule whose trigger matches fires;
/// deliveries no rule matches are ignored.
pub struct ScriptedVat
{
    name: String,
    rules: Vec<(Option<Regex>, Rule)>,
}

impl ScriptedVat
{
    /// Compile the rules of a vat.
    pub fn new(spec: &VatSpec) -> Result<Self, ScenarioError>
    {
        let mut rules = Vec::with_capacity(spec.rules.len());
        for rule in &spec.rules {
            let method = match &rule.on {
                Trigger::Message{method: Some(pattern)} =>
                    Some(Regex::new(pattern).map_err(|source| ScenarioError::Regex{
                        vat: spec.name.clone(),
                        pattern: pattern.clone(),
                        source,
                    })?),
                _ => None,
            };
            rules.push((method, rule.clone()));
        }
        Ok(Self{name: spec.name.clone(), rules})
    }

    fn matching_rule(&self, delivery: &VatDelivery) -> Option<&Rule>
    {
        self.rules.iter()
            .find(|(method, rule)| {
                if rule.on.kind() != delivery.kind() {
                    return false;
                }
                match (method, delivery) {
                    (Some(method), VatDelivery::Message{message, ..}) =>
                        method.is_match(&message.method),
                    _ => true,
                }
            })
            .map(|(_, rule)| rule)
    }
}

impl Vat for ScriptedVat
{
    fn dispatch(&mut self, delivery: &VatDelivery, syscalls: &mut Syscalls)
        -> Result<(), VatFailure>
    {
        let Some(rule) = self.matching_rule(delivery) else {
            trace!(vat = %self.name, delivery = delivery.kind(), "no rule");
            return Ok(());
        };

        if let Some(reason) = &rule.fail {
            return Err(VatFailure::Unexpected(anyhow::anyhow!("{reason}")));
        }

        for syscall in &rule.syscalls {
            syscalls.invoke(syscall.clone())?;
        }

        if rule.retire_delivered {
            if let VatDelivery::DropExports{vrefs} = delivery {
                syscalls.retire_exports(vrefs)?;
            }
        }

        if let Some(answer) = &rule.resolve_result {
            if let VatDelivery::Message{message: Message{result: Some(promise), ..}, ..}
                = delivery
            {
                syscalls.resolve(vec![Resolution{
                    promise: *promise,
                    rejected: answer.rejected,
                    data: answer.data.clone(),
                }])?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests
{
    use {super::*, crate::scenario::VatSpec};

    fn spec(json: &str) -> VatSpec
    {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn first_matching_rule_wins()
    {
        let vat = ScriptedVat::new(&spec(r#"{
            "name": "alice",
            "rules": [
                {"on": {"type": "message", "method": "^ping$"}, "fail": "pinged"},
                {"on": {"type": "message"}},
                {"on": {"type": "dropExports"}, "retireDelivered": true}
            ]
        }"#)).unwrap();

        let ping = serde_json::from_str(r#"{
            "type": "message",
            "target": "o+0",
            "message": {"method": "ping", "args": {"body": "[]", "slots": []}}
        }"#).unwrap();
        assert_eq!(vat.matching_rule(&ping).and_then(|r| r.fail.as_deref()),
                   Some("pinged"));

        let pong = serde_json::from_str(r#"{
            "type": "message",
            "target": "o+0",
            "message": {"method": "pingpong", "args": {"body": "[]", "slots": []}}
        }"#).unwrap();
        let rule = vat.matching_rule(&pong).unwrap();
        assert!(rule.fail.is_none() && !rule.retire_delivered);

        let dropped = VatDelivery::DropExports{vrefs: vec![]};
        assert!(vat.matching_rule(&dropped).unwrap().retire_delivered);

        let retired = VatDelivery::RetireExports{vrefs: vec![]};
        assert!(vat.matching_rule(&retired).is_none());
    }

    #[test]
    fn bad_pattern()
    {
        let result = ScriptedVat::new(&spec(r#"{
            "name": "alice",
            "rules": [{"on": {"type": "message", "method": "("}}]
        }"#));
        assert!(matches!(
            result,
            Err(ScenarioError::Regex{vat, pattern, ..}) if vat == "alice" && pattern == "(",
        ));
    }
}
