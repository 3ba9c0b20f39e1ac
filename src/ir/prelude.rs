//! Declarations every program is compiled against: the core library
//! (`packet_in`, `verify`, the standard errors) and the register/hash externs
//! of the switch architecture the stateful passes lower to.

use std::rc::Rc;

use super::{
    build::*,
    Declaration, Direction,
};

pub const STANDARD_ERRORS: &[&str] = &[
    "NoError",
    "PacketTooShort",
    "NoMatch",
    "StackOutOfBounds",
    "HeaderTooShort",
    "ParserTimeout",
    "ParserInvalidArgument",
];

/// `core.p4`: errors, packet externs, `verify` and `NoAction`
pub fn core_library() -> Vec<Rc<Declaration>> {
    vec![
        error_declaration(STANDARD_ERRORS),
        extern_type(
            "packet_in",
            Vec::new(),
            vec![
                method(
                    "extract",
                    vec![type_variable("T")],
                    void_type(),
                    vec![parameter(Direction::Out, "hdr", named_type("T"))],
                ),
                method(
                    "extract",
                    vec![type_variable("T")],
                    void_type(),
                    vec![
                        parameter(Direction::Out, "variableSizeHeader", named_type("T")),
                        parameter(Direction::In, "variableFieldSizeInBits", bits(32)),
                    ],
                ),
                method("lookahead", vec![type_variable("T")], named_type("T"), Vec::new()),
                method(
                    "advance",
                    Vec::new(),
                    void_type(),
                    vec![parameter(Direction::In, "sizeInBits", bits(32))],
                ),
                method("length", Vec::new(), bits(32), Vec::new()),
            ],
        ),
        extern_type(
            "packet_out",
            Vec::new(),
            vec![method(
                "emit",
                vec![type_variable("T")],
                void_type(),
                vec![parameter(Direction::In, "hdr", named_type("T"))],
            )],
        ),
        method(
            "verify",
            Vec::new(),
            void_type(),
            vec![
                parameter(Direction::In, "check", bool_type()),
                parameter(Direction::In, "toSignal", error_type()),
            ],
        ),
        action("NoAction", Vec::new(), Vec::new()),
    ]
}

/// Register, register action, hash, counter and meter externs
pub fn switch_architecture() -> Vec<Rc<Declaration>> {
    vec![
        extern_type(
            "Register",
            vec![type_variable("T"), type_variable("I")],
            vec![
                method(
                    "Register",
                    Vec::new(),
                    void_type(),
                    vec![parameter(Direction::None, "size", bits(32))],
                ),
                method(
                    "read",
                    Vec::new(),
                    void_type(),
                    vec![
                        parameter(Direction::Out, "result", named_type("T")),
                        parameter(Direction::In, "index", named_type("I")),
                    ],
                ),
                method(
                    "write",
                    Vec::new(),
                    void_type(),
                    vec![
                        parameter(Direction::In, "index", named_type("I")),
                        parameter(Direction::In, "value", named_type("T")),
                    ],
                ),
            ],
        ),
        extern_type(
            "RegisterAction",
            vec![type_variable("T"), type_variable("I"), type_variable("U")],
            vec![
                method(
                    "RegisterAction",
                    Vec::new(),
                    void_type(),
                    vec![parameter(
                        Direction::None,
                        "reg",
                        specialized_type("Register", vec![named_type("T"), named_type("I")]),
                    )],
                ),
                method(
                    "execute",
                    Vec::new(),
                    named_type("U"),
                    vec![parameter(Direction::In, "index", named_type("I"))],
                ),
                abstract_method(
                    "apply",
                    void_type(),
                    vec![
                        parameter(Direction::InOut, "value", named_type("T")),
                        annotated(
                            &parameter(Direction::Out, "rv", named_type("U")),
                            "optional",
                        ),
                    ],
                ),
            ],
        ),
        enumeration("HashAlgorithm", &["identity", "crc16", "crc32", "random"]),
        extern_type(
            "Hash",
            vec![type_variable("O")],
            vec![
                method(
                    "Hash",
                    Vec::new(),
                    void_type(),
                    vec![parameter(
                        Direction::None,
                        "algo",
                        named_type("HashAlgorithm"),
                    )],
                ),
                method(
                    "get",
                    vec![type_variable("D")],
                    named_type("O"),
                    vec![parameter(Direction::In, "data", named_type("D"))],
                ),
            ],
        ),
        extern_type(
            "Counter",
            vec![type_variable("I")],
            vec![
                method(
                    "Counter",
                    Vec::new(),
                    void_type(),
                    vec![parameter(Direction::None, "size", bits(32))],
                ),
                method(
                    "count",
                    Vec::new(),
                    void_type(),
                    vec![parameter(Direction::In, "index", named_type("I"))],
                ),
            ],
        ),
        extern_type(
            "Meter",
            vec![type_variable("I")],
            vec![
                method(
                    "Meter",
                    Vec::new(),
                    void_type(),
                    vec![parameter(Direction::None, "size", bits(32))],
                ),
                method(
                    "execute",
                    Vec::new(),
                    bits(2),
                    vec![
                        parameter(Direction::In, "index", named_type("I")),
                        parameter_with_default(Direction::In, "color", bits(2), sized(0, 2)),
                    ],
                ),
            ],
        ),
    ]
}

/// The core library followed by the switch architecture
pub fn standard_prelude() -> Vec<Rc<Declaration>> {
    let mut declarations = core_library();
    declarations.extend(switch_architecture());
    declarations
}
