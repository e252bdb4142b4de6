use crate::sandbox::ScriptMessage;
use rhai::{Array, Dynamic, Engine, EvalAltResult, ImmutableString};
use std::cell::RefCell;
use std::rc::Rc;
use tilemud_common::{Direction, EntityId, MapId};
use tilemud_kernel::{Archetype, Entity, World, WorldError};

type Fallible<T> = Result<T, Box<EvalAltResult>>;

/// State shared by every registered function during one invocation.
pub(crate) struct SandboxState {
    pub world: World,
    pub map: Option<MapId>,
    pub messages: Vec<ScriptMessage>,
}

pub(crate) type Shared = Rc<RefCell<SandboxState>>;

/// Handle to a world entity as seen from a script.
#[derive(Clone)]
pub struct ScriptEntity {
    id: EntityId,
    state: Shared,
}

impl ScriptEntity {
    pub(crate) fn new(id: EntityId, state: Shared) -> Self {
        Self { id, state }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    fn with<R>(&self, f: impl FnOnce(&Entity) -> R) -> Option<R> {
        self.state.borrow().world.get(self.id).map(f)
    }

    fn text(&self, f: impl FnOnce(&Entity) -> &str) -> ImmutableString {
        self.with(|e| ImmutableString::from(f(e))).unwrap_or_default()
    }

    fn update(&self, f: impl FnOnce(&mut World, EntityId) -> Result<(), WorldError>) -> Fallible<()> {
        f(&mut self.state.borrow_mut().world, self.id).map_err(fault)
    }

    /// Run a policy-checked move; a mob that actually moved gets its
    /// surroundings shown.
    fn moved(&self, f: impl FnOnce(&mut World, EntityId) -> Result<bool, WorldError>) -> Fallible<bool> {
        let mut state = self.state.borrow_mut();
        let moved = f(&mut state.world, self.id).map_err(fault)?;
        if moved && state.world.controller_of(self.id).is_some() {
            state.messages.push(ScriptMessage::ShowRoom(self.id));
        }
        Ok(moved)
    }
}

fn fault(err: WorldError) -> Box<EvalAltResult> {
    err.to_string().into()
}

fn wrap(state: &Shared, id: Option<EntityId>) -> Dynamic {
    match id {
        Some(id) => Dynamic::from(ScriptEntity::new(id, state.clone())),
        None => Dynamic::UNIT,
    }
}

fn direction(bits: i64) -> Fallible<Direction> {
    u8::try_from(bits)
        .ok()
        .and_then(Direction::from_bits)
        .ok_or_else(|| format!("{bits} is not a direction").into())
}

fn coord(v: i64) -> i32 {
    i32::try_from(v).unwrap_or(i32::MIN)
}

pub(crate) fn register(engine: &mut Engine, state: &Shared) {
    register_entity(engine);
    register_world(engine, state);
}

fn register_entity(engine: &mut Engine) {
    engine.register_type_with_name::<ScriptEntity>("Entity");
    engine.register_fn("==", |a: &mut ScriptEntity, b: ScriptEntity| a.id == b.id);
    engine.register_fn("!=", |a: &mut ScriptEntity, b: ScriptEntity| a.id != b.id);
    engine.register_fn("to_string", |e: &mut ScriptEntity| e.text(Entity::display));

    engine.register_get("id", |e: &mut ScriptEntity| e.id.0 as i64);
    engine.register_get("exists", |e: &mut ScriptEntity| e.with(|_| ()).is_some());
    engine.register_get("kind", |e: &mut ScriptEntity| e.text(|x| x.kind().name()));
    engine.register_get("keywords", |e: &mut ScriptEntity| e.text(Entity::keywords));
    engine.register_get("display", |e: &mut ScriptEntity| e.text(Entity::display));
    engine.register_get("description", |e: &mut ScriptEntity| {
        e.with(|x| x.description().map(|d| Dynamic::from(d.to_string())))
            .flatten()
            .unwrap_or(Dynamic::UNIT)
    });
    engine.register_get("location", |e: &mut ScriptEntity| {
        let location = e.with(Entity::location).flatten();
        wrap(&e.state, location)
    });
    engine.register_get("contents", |e: &mut ScriptEntity| {
        let ids = e.with(|x| x.contents().to_vec()).unwrap_or_default();
        ids.into_iter().map(|id| wrap(&e.state, Some(id))).collect::<Array>()
    });
    engine.register_get("coordinates", |e: &mut ScriptEntity| {
        match e.with(Entity::coordinates).flatten() {
            Some(c) => Dynamic::from_array(vec![
                Dynamic::from(c.x as i64),
                Dynamic::from(c.y as i64),
                Dynamic::from(c.z as i64),
            ]),
            None => Dynamic::UNIT,
        }
    });

    engine.register_set("keywords", |e: &mut ScriptEntity, v: ImmutableString| {
        e.update(|w, id| w.set_keywords(id, v.as_str()))
    });
    engine.register_set("display", |e: &mut ScriptEntity, v: ImmutableString| {
        e.update(|w, id| w.set_display(id, v.as_str()))
    });
    engine.register_set("description", |e: &mut ScriptEntity, v: ImmutableString| {
        e.update(|w, id| w.set_description(id, Some(v.to_string())))
    });
    engine.register_fn("clear_description", |e: ScriptEntity| {
        e.update(|w, id| w.set_description(id, None))
    });

    // Linking.
    engine.register_fn("place", |e: ScriptEntity, location: ScriptEntity| {
        e.update(|w, id| w.set_location(id, Some(location.id)))
    });
    engine.register_fn("remove", |e: ScriptEntity| e.update(|w, id| w.set_location(id, None)));
    engine.register_fn("move_into", |e: ScriptEntity, location: ScriptEntity| -> Fallible<bool> {
        e.moved(|w, id| w.move_entity(id, location.id))
    });
    engine.register_fn("step", |e: ScriptEntity, dir: i64| -> Fallible<bool> {
        let dir = direction(dir)?;
        e.moved(|w, id| w.step(id, dir))
    });
    engine.register_fn("neighbor", |e: ScriptEntity, dir: i64| -> Fallible<Dynamic> {
        let dir = direction(dir)?;
        let tile = e.state.borrow().world.neighbor(e.id, dir);
        Ok(wrap(&e.state, tile))
    });
    engine.register_fn("attach_map", |e: ScriptEntity| {
        let map = e.state.borrow().map;
        e.update(|w, id| w.set_map(id, map))
    });
    engine.register_fn("detach_map", |e: ScriptEntity| e.update(|w, id| w.set_map(id, None)));
    engine.register_fn("destroy", |e: ScriptEntity| e.update(|w, id| w.despawn(id).map(|_| ())));

    engine.register_fn("tell", |e: ScriptEntity, text: &str| {
        let mut state = e.state.borrow_mut();
        if let Some(player) = state.world.controller_of(e.id) {
            state.messages.push(ScriptMessage::Tell {
                player,
                text: text.to_string(),
            });
        }
    });
}

fn register_world(engine: &mut Engine, state: &Shared) {
    let s = state.clone();
    engine.register_fn("broadcast", move |text: &str| {
        s.borrow_mut()
            .messages
            .push(ScriptMessage::Broadcast(text.to_string()));
    });

    let s = state.clone();
    engine.register_fn("locate", move |x: i64, y: i64, z: i64| {
        let tile = {
            let st = s.borrow();
            st.map
                .and_then(|m| st.world.locate(m, coord(x), coord(y), coord(z)))
        };
        wrap(&s, tile)
    });

    let s = state.clone();
    engine.register_fn("create", move |kind: &str| -> Fallible<ScriptEntity> {
        let archetype = Archetype::from_name(kind).ok_or_else(|| format!("cannot create '{kind}'"))?;
        let id = s.borrow_mut().world.spawn(archetype);
        Ok(ScriptEntity::new(id, s.clone()))
    });

    engine.register_fn("direction", |name: &str| match Direction::from_name(name) {
        Some(d) => Dynamic::from(d.bits() as i64),
        None => Dynamic::UNIT,
    });
    engine.register_fn("direction_name", |bits: i64| {
        match u8::try_from(bits).ok().and_then(Direction::from_bits) {
            Some(d) => Dynamic::from(d.long_name().to_string()),
            None => Dynamic::UNIT,
        }
    });

    engine.register_fn("log", |text: &str| {
        tracing::info!(target: "tilemud::script", "{text}");
    });
}
