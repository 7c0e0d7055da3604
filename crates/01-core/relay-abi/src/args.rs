use smallvec::SmallVec;

/// One field of a structured record argument.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    /// Signed integer.
    Int(i64),
    /// Boolean flag.
    Bool(bool),
    /// Nullable string.
    Text(Option<String>),
    /// Opaque bytes.
    Bytes(Vec<u8>),
}

/// Typed argument vector for one request, one variant per payload shape.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Args {
    /// No arguments.
    Void,
    /// Nullable strings.
    Strings(SmallVec<[Option<String>; 4]>),
    /// 32-bit integers.
    Ints(SmallVec<[i32; 4]>),
    /// Opaque bytes.
    Raw(Vec<u8>),
    /// One structured record.
    Record(Vec<Value>),
}

impl Args {
    /// Builds a string argument list where every entry is present.
    pub fn strings<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Args::Strings(values.into_iter().map(|s| Some(s.into())).collect())
    }

    /// Builds an integer argument list.
    pub fn ints<I>(values: I) -> Self
    where
        I: IntoIterator<Item = i32>,
    {
        Args::Ints(values.into_iter().collect())
    }
}
