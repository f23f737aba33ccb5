//! Script-visible `rings` library
//!
//! ```lua
//! local r = rings.new()            -- or rings.new(env)
//! print(r:dostring("return 1 + 1")) --> true  2
//! r:close()
//! ```
//!
//! Every created context also gets a global `remotedostring(code, ...)`
//! that runs `code` in the context that most recently called into it.

use crate::context::RingContext;
use crate::error::RingsError;
use crate::lifecycle::Ring;
use crate::remote::{self, CallOutcome};
use rings_engine::{ScriptError, State, TableRef, Value};
use std::rc::{Rc, Weak};

pub const COPYRIGHT: &str = "Copyright (C) 2006 Kepler Project";
pub const DESCRIPTION: &str = "Rings: Multiple Lua States";
pub const VERSION: &str = "Rings 1.2.2";

/// What `getmetatable` returns for a ring handle
pub const PROTECTED_METATABLE: &str = "You're not allowed to get the metatable of a ring";

/// Registry key of the handle metatable
const HANDLE_METATABLE: &str = "rings.handle";

/// Install the `rings` table in `context`.
pub(crate) fn open(context: &Rc<RingContext>) -> Result<(), RingsError> {
    let state = context.open_state()?;
    let owner = Rc::downgrade(context);

    let metatable = handle_metatable(&state, &owner);
    state
        .registry()
        .set_str(HANDLE_METATABLE, Value::Table(metatable));

    let library = state.new_table();
    let new_owner = owner.clone();
    library.set_str(
        "new",
        state.create_function("new", move |state, args| new_ring(state, &new_owner, args)),
    );
    library.set_str("_COPYRIGHT", Value::from(COPYRIGHT));
    library.set_str("_DESCRIPTION", Value::from(DESCRIPTION));
    library.set_str("_VERSION", Value::from(VERSION));
    state.globals().set_str("rings", Value::Table(library));

    wrap_collectgarbage(&state, owner);
    Ok(())
}

/// Install `remotedostring` in a created context.
pub(crate) fn install_remote(child: &Rc<RingContext>) -> Result<(), RingsError> {
    let state = child.open_state()?;
    let this = Rc::downgrade(child);

    let function = state.create_function("remotedostring", move |state, args| {
        let child = this.upgrade().ok_or_else(|| state.error("rings: ring is gone"))?;
        let source = check_code(state, &args, 0, "remotedostring")?;
        let rings = child
            .rings
            .upgrade()
            .ok_or_else(|| raise(state, RingsError::ManagerDropped))?;
        let rest: Vec<Value> = args.into_iter().skip(1).collect();
        remote::reverse(&rings, &child, &source, rest)
            .map(CallOutcome::into_script_values)
            .map_err(|err| raise(state, err))
    });
    state.globals().set_str("remotedostring", function);
    Ok(())
}

fn handle_metatable(state: &State, owner: &Weak<RingContext>) -> TableRef {
    let methods = state.new_table();
    let dostring_owner = owner.clone();
    methods.set_str(
        "dostring",
        state.create_function("dostring", move |state, args| {
            handle_dostring(state, &dostring_owner, args)
        }),
    );
    methods.set_str(
        "close",
        state.create_function("close", |state, args| {
            let ring = check_ring(state, &args, "close")?;
            let closed = ring.close().map_err(|err| raise(state, err))?;
            Ok(vec![Value::Boolean(closed)])
        }),
    );

    let metatable = state.new_table();
    metatable.set_str("__index", Value::Table(methods));
    metatable.set_str(
        "__tostring",
        state.create_function("tostring", |state, args| {
            let ring = check_ring(state, &args, "tostring")?;
            Ok(vec![Value::string(ring.describe())])
        }),
    );
    metatable.set_str("__metatable", Value::from(PROTECTED_METATABLE));
    metatable
}

// ============================================================================
// Natives
// ============================================================================

fn new_ring(
    state: &State,
    owner: &Weak<RingContext>,
    args: Vec<Value>,
) -> Result<Vec<Value>, ScriptError> {
    let environment = match args.first() {
        None | Some(Value::Nil) => None,
        Some(Value::Table(table)) => Some(table.clone()),
        Some(other) => {
            return Err(raise(
                state,
                RingsError::BadArgument {
                    position: 1,
                    function: "new",
                    message: format!("table expected, got {}", other.type_name()),
                },
            ))
        }
    };

    let creator = owner
        .upgrade()
        .ok_or_else(|| state.error("rings: creating context is gone"))?;
    let rings = creator
        .rings
        .upgrade()
        .ok_or_else(|| raise(state, RingsError::ManagerDropped))?;
    let ring = rings
        .create(&creator, environment)
        .map_err(|err| raise(state, err))?;

    let metatable = state.registry().get_str(HANDLE_METATABLE).as_table().cloned();
    Ok(vec![state.create_userdata(ring, metatable)])
}

fn handle_dostring(
    state: &State,
    owner: &Weak<RingContext>,
    args: Vec<Value>,
) -> Result<Vec<Value>, ScriptError> {
    let ring = check_ring(state, &args, "dostring")?;
    let source = check_code(state, &args, 1, "dostring")?;
    let caller = owner
        .upgrade()
        .ok_or_else(|| state.error("rings: calling context is gone"))?;

    let rest: Vec<Value> = args.into_iter().skip(2).collect();
    ring.dostring_from(&caller, &source, rest)
        .map(CallOutcome::into_script_values)
        .map_err(|err| raise(state, err))
}

/// `collectgarbage` that also sweeps the chunk caches on a full collection.
fn wrap_collectgarbage(state: &State, owner: Weak<RingContext>) {
    let globals = state.globals();
    let original = globals.get_str("collectgarbage");
    if original.is_nil() {
        return;
    }

    let wrapper = state.create_function("collectgarbage", move |state, args| {
        let full = match args.first() {
            None | Some(Value::Nil) => true,
            Some(option) => option.as_str() == Some("collect"),
        };
        if full {
            if let Some(rings) = owner.upgrade().and_then(|context| context.rings.upgrade()) {
                rings.sweep_caches();
            }
        }
        state.call(&original, args)
    });
    globals.set_str("collectgarbage", wrapper);
}

// ============================================================================
// Argument checks
// ============================================================================

fn raise(state: &State, err: RingsError) -> ScriptError {
    state.error(err.to_string())
}

fn check_ring(state: &State, args: &[Value], function: &'static str) -> Result<Ring, ScriptError> {
    let ring = match args.first() {
        Some(Value::Userdata(userdata)) => userdata.downcast_ref::<Ring>().cloned(),
        _ => None,
    };
    ring.ok_or_else(|| {
        let got = args.first().map_or("no value", Value::type_name);
        raise(
            state,
            RingsError::BadArgument {
                position: 1,
                function,
                message: format!("ring expected, got {}", got),
            },
        )
    })
}

/// Source text at `index`; numbers are converted. Reported as argument #1.
fn check_code(
    state: &State,
    args: &[Value],
    index: usize,
    function: &'static str,
) -> Result<String, ScriptError> {
    let value = args.get(index);
    match value.and_then(Value::to_text) {
        Some(text) => Ok(text.to_string()),
        None => {
            let got = value.map_or("no value", Value::type_name);
            Err(raise(
                state,
                RingsError::BadArgument {
                    position: 1,
                    function,
                    message: format!("string expected, got {}", got),
                },
            ))
        }
    }
}
