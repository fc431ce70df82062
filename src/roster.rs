//! The roster: one optional credential per leaf. Removed members leave a
//! gap so the remaining indices keep their meaning.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::crypto::credential::Credential;
use crate::utilities::error::{Error, Result};
use crate::utilities::serde::{
    deserialize_optional, deserialize_vector, serialize_optional, serialize_vector, Deserializer,
    Serializer,
};
use crate::utilities::tree_math::LeafIndex;

#[derive(Default, Debug, Clone, Eq, PartialEq)]
pub struct Roster(Vec<Option<Credential>>);

impl Roster {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: LeafIndex) -> Option<&Credential> {
        self.0.get(index.0 as usize).and_then(Option::as_ref)
    }

    /// Sets the credential at `index`, appending a slot when the index is
    /// one past the end.
    pub fn add(&mut self, index: LeafIndex, credential: Credential) -> Result<()> {
        let i = index.0 as usize;
        if i == self.0.len() {
            self.0.push(Some(credential));
            Ok(())
        } else if i < self.0.len() {
            if self.0[i].is_some() {
                return Err(Error::DuplicateLeaf);
            }
            self.0[i] = Some(credential);
            Ok(())
        } else {
            Err(Error::LeafIndexOutOfRange)
        }
    }

    /// Clears the slot at `index`; the gap stays.
    pub fn remove(&mut self, index: LeafIndex) -> Result<()> {
        let i = index.0 as usize;
        let slot = self.0.get_mut(i).ok_or(Error::LeafIndexOutOfRange)?;
        if slot.is_none() {
            return Err(Error::BlankLeaf);
        }
        *slot = None;
        Ok(())
    }
}

impl Deserializer for Roster {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let mut slots = vec![];
        deserialize_vector(buf, 4, |b: &mut Bytes| -> Result<()> {
            let present = deserialize_optional(b)?;
            if present {
                slots.push(Some(Credential::deserialize(b)?));
            } else {
                slots.push(None);
            }
            Ok(())
        })?;
        Ok(Self(slots))
    }
}

impl Serializer for Roster {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        serialize_vector(
            self.0.len(),
            4,
            buf,
            |i: usize, b: &mut BytesMut| -> Result<()> {
                serialize_optional(self.0[i].is_some(), b)?;
                if let Some(credential) = &self.0[i] {
                    credential.serialize(b)?;
                }
                Ok(())
            },
        )
    }
}
