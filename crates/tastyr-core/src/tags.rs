//! Tree tags of the ASTs section.
//!
//! Tags are partitioned by magic ranges into five wire shapes, so a scanner
//! can skip any subtree without interpreting it:
//!
//! | range     | shape                         |
//! |-----------|-------------------------------|
//! | 1..=59    | tag only                      |
//! | 60..=89   | tag, one nat                  |
//! | 90..=109  | tag, one subtree              |
//! | 110..=127 | tag, one nat, one subtree     |
//! | 128..=255 | tag, length-prefixed payload  |

use crate::error::{Result, UnpickleError};

pub const FIRST_NAT_TAG: u8 = 60;
pub const FIRST_AST_TAG: u8 = 90;
pub const FIRST_NAT_AST_TAG: u8 = 110;
pub const FIRST_LENGTH_TAG: u8 = 128;

/// Wire shape of a tag, derived from its magic range.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TagShape {
    /// No payload.
    Leaf,
    /// One nat.
    Nat,
    /// One subtree.
    Ast,
    /// One nat followed by one subtree.
    NatAst,
    /// Length prefix, then an uninterpreted payload up to the end address.
    Lengthed,
}

/// Classify a raw tag byte by magic range. Total: unknown tags still skip
/// correctly by shape.
pub fn shape_of(tag: u8) -> TagShape {
    match tag {
        0..FIRST_NAT_TAG => TagShape::Leaf,
        FIRST_NAT_TAG..FIRST_AST_TAG => TagShape::Nat,
        FIRST_AST_TAG..FIRST_NAT_AST_TAG => TagShape::Ast,
        FIRST_NAT_AST_TAG..FIRST_LENGTH_TAG => TagShape::NatAst,
        FIRST_LENGTH_TAG..=u8::MAX => TagShape::Lengthed,
    }
}

/// Every tree tag this reader understands.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[repr(u8)]
pub enum Tag {
    // Tag only.
    UnitConst = 2,
    FalseConst = 3,
    TrueConst = 4,
    NullConst = 5,
    Private = 6,
    Protected = 8,
    Abstract = 9,
    Final = 10,
    Sealed = 11,
    Case = 12,
    Implicit = 13,
    Lazy = 14,
    Override = 15,
    InlineProxy = 16,
    Inline = 17,
    Static = 18,
    Object = 19,
    Trait = 20,
    Enum = 21,
    Local = 22,
    Synthetic = 23,
    Artifact = 24,
    Mutable = 25,
    CaseAccessor = 26,
    Covariant = 27,
    Contravariant = 28,
    Scala2X = 29,
    DefaultParameterized = 30,
    Stable = 31,
    Macro = 32,
    Erased = 33,
    Opaque = 34,
    Extension = 35,
    Given = 36,
    ParamSetter = 37,
    Exported = 38,
    Open = 39,
    ParamAlias = 40,
    Transparent = 41,
    Infix = 42,
    Invisible = 43,
    EmptyClause = 44,
    SplitClause = 45,

    // Tag, one nat.
    SharedTerm = 60,
    SharedType = 61,
    TermRefDirect = 62,
    TypeRefDirect = 63,
    TermRefPkg = 64,
    TypeRefPkg = 65,
    RecThis = 66,
    ByteConst = 67,
    ShortConst = 68,
    CharConst = 69,
    IntConst = 70,
    LongConst = 71,
    FloatConst = 72,
    DoubleConst = 73,
    StringConst = 74,
    Imported = 75,
    Renamed = 76,

    // Tag, one subtree.
    This = 90,
    QualThis = 91,
    ClassConst = 92,
    ByNameType = 93,
    ByNameTpt = 94,
    New = 95,
    Throw = 96,
    ImplicitArg = 97,
    PrivateQualified = 98,
    ProtectedQualified = 99,
    RecType = 100,
    SingletonTpt = 101,
    Bounded = 102,

    // Tag, one nat, one subtree.
    Ident = 110,
    IdentTpt = 111,
    Select = 112,
    SelectTpt = 113,
    TermRefSymbol = 114,
    TermRef = 115,
    TypeRefSymbol = 116,
    TypeRef = 117,
    SelfDef = 118,
    NamedArg = 119,

    // Length-prefixed.
    Package = 128,
    ValDef = 129,
    DefDef = 130,
    TypeDef = 131,
    Import = 132,
    TypeParam = 133,
    Param = 134,
    Apply = 136,
    TypeApply = 137,
    Typed = 138,
    Assign = 139,
    Block = 140,
    If = 141,
    Lambda = 142,
    Match = 143,
    Return = 144,
    While = 145,
    Try = 146,
    Inlined = 147,
    SelectOuter = 148,
    Repeated = 149,
    Alternative = 150,
    Unapply = 151,
    AnnotatedType = 152,
    AnnotatedTpt = 153,
    CaseDef = 154,
    Template = 155,
    Super = 156,
    SuperType = 157,
    RefinedType = 158,
    RefinedTpt = 159,
    AppliedType = 160,
    AppliedTpt = 161,
    TypeBounds = 162,
    TypeBoundsTpt = 163,
    AndType = 164,
    OrType = 166,
    PolyType = 168,
    TypeLambdaType = 169,
    LambdaTpt = 170,
    ParamType = 171,
    Annotation = 172,
    TermRefIn = 173,
    TypeRefIn = 174,
    MethodType = 180,
    ImplicitMethodType = 181,
    GivenMethodType = 182,
    MatchType = 190,
    MatchTpt = 191,
    Hole = 255,
}

impl Tag {
    /// Decode a raw byte, or report it as a wire violation.
    pub fn decode(byte: u8, at: impl std::fmt::Display) -> Result<Tag> {
        Tag::from_u8(byte)
            .ok_or_else(|| UnpickleError::format(format!("unknown tree tag {byte} at {at}")))
    }

    pub fn from_u8(byte: u8) -> Option<Tag> {
        use Tag::*;
        Some(match byte {
            2 => UnitConst,
            3 => FalseConst,
            4 => TrueConst,
            5 => NullConst,
            6 => Private,
            8 => Protected,
            9 => Abstract,
            10 => Final,
            11 => Sealed,
            12 => Case,
            13 => Implicit,
            14 => Lazy,
            15 => Override,
            16 => InlineProxy,
            17 => Inline,
            18 => Static,
            19 => Object,
            20 => Trait,
            21 => Enum,
            22 => Local,
            23 => Synthetic,
            24 => Artifact,
            25 => Mutable,
            26 => CaseAccessor,
            27 => Covariant,
            28 => Contravariant,
            29 => Scala2X,
            30 => DefaultParameterized,
            31 => Stable,
            32 => Macro,
            33 => Erased,
            34 => Opaque,
            35 => Extension,
            36 => Given,
            37 => ParamSetter,
            38 => Exported,
            39 => Open,
            40 => ParamAlias,
            41 => Transparent,
            42 => Infix,
            43 => Invisible,
            44 => EmptyClause,
            45 => SplitClause,
            60 => SharedTerm,
            61 => SharedType,
            62 => TermRefDirect,
            63 => TypeRefDirect,
            64 => TermRefPkg,
            65 => TypeRefPkg,
            66 => RecThis,
            67 => ByteConst,
            68 => ShortConst,
            69 => CharConst,
            70 => IntConst,
            71 => LongConst,
            72 => FloatConst,
            73 => DoubleConst,
            74 => StringConst,
            75 => Imported,
            76 => Renamed,
            90 => This,
            91 => QualThis,
            92 => ClassConst,
            93 => ByNameType,
            94 => ByNameTpt,
            95 => New,
            96 => Throw,
            97 => ImplicitArg,
            98 => PrivateQualified,
            99 => ProtectedQualified,
            100 => RecType,
            101 => SingletonTpt,
            102 => Bounded,
            110 => Ident,
            111 => IdentTpt,
            112 => Select,
            113 => SelectTpt,
            114 => TermRefSymbol,
            115 => TermRef,
            116 => TypeRefSymbol,
            117 => TypeRef,
            118 => SelfDef,
            119 => NamedArg,
            128 => Package,
            129 => ValDef,
            130 => DefDef,
            131 => TypeDef,
            132 => Import,
            133 => TypeParam,
            134 => Param,
            136 => Apply,
            137 => TypeApply,
            138 => Typed,
            139 => Assign,
            140 => Block,
            141 => If,
            142 => Lambda,
            143 => Match,
            144 => Return,
            145 => While,
            146 => Try,
            147 => Inlined,
            148 => SelectOuter,
            149 => Repeated,
            150 => Alternative,
            151 => Unapply,
            152 => AnnotatedType,
            153 => AnnotatedTpt,
            154 => CaseDef,
            155 => Template,
            156 => Super,
            157 => SuperType,
            158 => RefinedType,
            159 => RefinedTpt,
            160 => AppliedType,
            161 => AppliedTpt,
            162 => TypeBounds,
            163 => TypeBoundsTpt,
            164 => AndType,
            166 => OrType,
            168 => PolyType,
            169 => TypeLambdaType,
            170 => LambdaTpt,
            171 => ParamType,
            172 => Annotation,
            173 => TermRefIn,
            174 => TypeRefIn,
            180 => MethodType,
            181 => ImplicitMethodType,
            182 => GivenMethodType,
            190 => MatchType,
            191 => MatchTpt,
            255 => Hole,
            _ => return None,
        })
    }

    #[inline]
    pub fn shape(self) -> TagShape {
        shape_of(self as u8)
    }

    /// Definition tags that get their own symbol shell.
    pub fn is_member_def(self) -> bool {
        matches!(
            self,
            Tag::ValDef | Tag::DefDef | Tag::TypeDef | Tag::TypeParam | Tag::Param
        )
    }

    /// Tags legal in a modifier tail.
    pub fn is_modifier(self) -> bool {
        matches!(
            self,
            Tag::Private
                | Tag::Protected
                | Tag::Abstract
                | Tag::Final
                | Tag::Sealed
                | Tag::Case
                | Tag::Implicit
                | Tag::Lazy
                | Tag::Override
                | Tag::InlineProxy
                | Tag::Inline
                | Tag::Static
                | Tag::Object
                | Tag::Trait
                | Tag::Enum
                | Tag::Local
                | Tag::Synthetic
                | Tag::Artifact
                | Tag::Mutable
                | Tag::CaseAccessor
                | Tag::Covariant
                | Tag::Contravariant
                | Tag::Scala2X
                | Tag::DefaultParameterized
                | Tag::Stable
                | Tag::Macro
                | Tag::Erased
                | Tag::Opaque
                | Tag::Extension
                | Tag::Given
                | Tag::ParamSetter
                | Tag::Exported
                | Tag::Open
                | Tag::ParamAlias
                | Tag::Transparent
                | Tag::Infix
                | Tag::Invisible
                | Tag::PrivateQualified
                | Tag::ProtectedQualified
                | Tag::Annotation
        )
    }

    /// Tags that introduce a type-position tree.
    pub fn is_type_tree(self) -> bool {
        matches!(
            self,
            Tag::IdentTpt
                | Tag::SelectTpt
                | Tag::SingletonTpt
                | Tag::RefinedTpt
                | Tag::AppliedTpt
                | Tag::LambdaTpt
                | Tag::TypeBoundsTpt
                | Tag::AnnotatedTpt
                | Tag::ByNameTpt
                | Tag::MatchTpt
        )
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shapes_follow_magic_ranges() {
        assert_eq!(shape_of(Tag::Private as u8), TagShape::Leaf);
        assert_eq!(shape_of(Tag::SharedType as u8), TagShape::Nat);
        assert_eq!(shape_of(Tag::RecType as u8), TagShape::Ast);
        assert_eq!(shape_of(Tag::TypeRef as u8), TagShape::NatAst);
        assert_eq!(shape_of(Tag::Template as u8), TagShape::Lengthed);
        assert_eq!(shape_of(Tag::Hole as u8), TagShape::Lengthed);
    }

    #[test]
    fn unknown_bytes_still_classify() {
        // 135 is unassigned but sits in the length-prefixed range, so a
        // scanner can skip it.
        assert!(Tag::from_u8(135).is_none());
        assert_eq!(shape_of(135), TagShape::Lengthed);
    }

    #[test]
    fn roundtrip_discriminants() {
        for byte in 0..=u8::MAX {
            if let Some(tag) = Tag::from_u8(byte) {
                assert_eq!(tag as u8, byte);
            }
        }
    }

    #[test]
    fn member_defs_are_length_prefixed() {
        for tag in [Tag::ValDef, Tag::DefDef, Tag::TypeDef, Tag::TypeParam, Tag::Param] {
            assert!(tag.is_member_def());
            assert_eq!(tag.shape(), TagShape::Lengthed);
        }
    }
}
