//! A single resource: identifier, optional name and payload.

use crate::data::Block;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    id:        i64,
    name:      String,
    type_code: String,
    data:      Block,
}

impl Instance {
    pub fn new(type_code: impl Into<String>, id: i64, name: impl Into<String>, data: Block) -> Self {
        Self {
            id,
            name: name.into(),
            type_code: type_code.into(),
            data,
        }
    }

    #[inline]
    pub fn id(&self) -> i64 { self.id }

    #[inline]
    pub fn name(&self) -> &str { &self.name }

    /// Code of the type this instance belongs to.
    #[inline]
    pub fn type_code(&self) -> &str { &self.type_code }

    #[inline]
    pub fn data(&self) -> &Block { &self.data }

    pub fn data_mut(&mut self) -> &mut Block { &mut self.data }

    pub fn set_data(&mut self, data: Block) {
        self.data = data;
    }

    pub(crate) fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Payload size in bytes.
    pub fn size(&self) -> usize {
        self.data.size()
    }
}
