use syn::{Attribute, Error, LitStr};

pub struct FieldAttributes {
    pub name: Option<LitStr>,
    pub ignore: bool,
}

impl TryFrom<&Attribute> for FieldAttributes {
    type Error = Error;

    fn try_from(value: &Attribute) -> Result<Self, Self::Error> {
        let mut name = None;
        let mut ignore = false;
        value.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                name = Some(meta.value().and_then(|value| value.parse())?);
            } else if meta.path.is_ident("ignore") {
                ignore = true;
            } else {
                return Err(meta.error("unsupported binding attribute"));
            }

            Ok(())
        })?;

        Ok(Self { name, ignore })
    }
}

pub struct TableAttributes {
    pub name: Option<LitStr>,
}

impl TryFrom<&Attribute> for TableAttributes {
    type Error = Error;

    fn try_from(value: &Attribute) -> Result<Self, Self::Error> {
        let mut name = None;
        value.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                name = Some(meta.value().and_then(|value| value.parse())?);
            } else {
                return Err(meta.error("unsupported binding attribute"));
            }

            Ok(())
        })?;

        Ok(Self { name })
    }
}
