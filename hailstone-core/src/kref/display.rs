use {
    super::*,
    serde::{Deserialize, Deserializer, Serialize, Serializer, de},
    std::{fmt::{self, Debug, Display, Formatter}, str::FromStr},
};

impl Display for Kref
{
    fn fmt(&self, f: &mut Formatter) -> fmt::Result
    {
        match self.kind {
            RefKind::Object  => write!(f, "ko{}", self.id),
            RefKind::Promise => write!(f, "kp{}", self.id),
        }
    }
}

impl Display for Vref
{
    fn fmt(&self, f: &mut Formatter) -> fmt::Result
    {
        let kind = match self.kind {
            RefKind::Object  => 'o',
            RefKind::Promise => 'p',
        };
        let sign = match self.allocator {
            Allocator::Vat    => '+',
            Allocator::Kernel => '-',
        };
        write!(f, "{kind}{sign}{}", self.id)
    }
}

impl Display for VatId
{
    fn fmt(&self, f: &mut Formatter) -> fmt::Result
    {
        write!(f, "v{}", self.0)
    }
}

impl FromStr for Kref
{
    type Err = ParseRefError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        let error = || ParseRefError::Kref(s.to_owned());
        let (kind, digits) =
            if let Some(digits) = s.strip_prefix("ko") {
                (RefKind::Object, digits)
            } else if let Some(digits) = s.strip_prefix("kp") {
                (RefKind::Promise, digits)
            } else {
                return Err(error());
            };
        let id = parse_id(digits).ok_or_else(error)?;
        Ok(Self{kind, id})
    }
}

impl FromStr for Vref
{
    type Err = ParseRefError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        let error = || ParseRefError::Vref(s.to_owned());
        let mut chars = s.chars();
        let kind = match chars.next() {
            Some('o') => RefKind::Object,
            Some('p') => RefKind::Promise,
            _ => return Err(error()),
        };
        let allocator = match chars.next() {
            Some('+') => Allocator::Vat,
            Some('-') => Allocator::Kernel,
            _ => return Err(error()),
        };
        let id = parse_id(chars.as_str()).ok_or_else(error)?;
        Ok(Self{kind, allocator, id})
    }
}

impl FromStr for VatId
{
    type Err = ParseRefError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        s.strip_prefix('v')
            .and_then(parse_id)
            .and_then(|id| u32::try_from(id).ok())
            .map(Self)
            .ok_or_else(|| ParseRefError::VatId(s.to_owned()))
    }
}

/// Parse a decimal number without sign or leading zeroes.
fn parse_id(digits: &str) -> Option<u64>
{
    let canonical = !digits.is_empty()
        && digits.bytes().all(|b| b.is_ascii_digit())
        && (digits == "0" || !digits.starts_with('0'));
    if canonical { digits.parse().ok() } else { None }
}

// Debug output is the same as Display output,
// which keeps assertion failures and dumps readable.
// Serialization uses the string form so krefs can be map keys.
macro_rules! string_form
{
    ($($type:ty),*) => {
        $(
            impl Debug for $type
            {
                fn fmt(&self, f: &mut Formatter) -> fmt::Result
                {
                    Display::fmt(self, f)
                }
            }

            impl Serialize for $type
            {
                fn serialize<S>(&self, serializer: S)
                    -> Result<S::Ok, S::Error>
                    where S: Serializer
                {
                    serializer.collect_str(self)
                }
            }

            impl<'de> Deserialize<'de> for $type
            {
                fn deserialize<D>(deserializer: D)
                    -> Result<Self, D::Error>
                    where D: Deserializer<'de>
                {
                    let string = String::deserialize(deserializer)?;
                    string.parse().map_err(de::Error::custom)
                }
            }
        )*
    };
}

string_form!(Kref, Vref, VatId);

#[cfg(test)]
mod tests
{
    use {super::*, proptest::proptest};

    #[test]
    fn display()
    {
        assert_eq!(Kref::object(20).to_string(), "ko20");
        assert_eq!(Kref::promise(40).to_string(), "kp40");
        assert_eq!(Vref::object_export(101).to_string(), "o+101");
        assert_eq!(Vref::promise_import(60).to_string(), "p-60");
        assert_eq!(VatId(3).to_string(), "v3");
    }

    #[test]
    fn parse_rejects_garbage()
    {
        for bad in ["", "k", "ko", "kx1", "ko-1", "ko01", "ko1a"] {
            assert!(bad.parse::<Kref>().is_err(), "{bad:?}");
        }
        for bad in ["o", "o+", "o*1", "q+1", "p-01", "o+1 "] {
            assert!(bad.parse::<Vref>().is_err(), "{bad:?}");
        }
        for bad in ["1", "v", "v-1", "v99999999999"] {
            assert!(bad.parse::<VatId>().is_err(), "{bad:?}");
        }
    }

    #[test]
    fn serde_string_form()
    {
        let json = serde_json::to_string(&(Kref::object(22), VatId(1))).unwrap();
        assert_eq!(json, r#"["ko22","v1"]"#);
        let vref: Vref = serde_json::from_str(r#""o-50""#).unwrap();
        assert_eq!(vref, Vref::object_import(50));
    }

    proptest!
    {
        #[test]
        fn vref_parses_own_display(object: bool, export: bool, id: u64)
        {
            let vref = match (object, export) {
                (true,  true)  => Vref::object_export(id),
                (true,  false) => Vref::object_import(id),
                (false, true)  => Vref::promise_export(id),
                (false, false) => Vref::promise_import(id),
            };
            assert_eq!(vref.to_string().parse::<Vref>(), Ok(vref));
        }
    }
}
