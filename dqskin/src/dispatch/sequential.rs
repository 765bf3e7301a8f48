use crate::{
    BackendKind, BonePalette, DeformedFrame, DispatchError, Frame, MeshTopology, SkinData,
    SkinningAlgorithm, SkinningBackend, SkinningConfig, compute_tension, skin_vertex,
};
use glam::Vec3;
use std::any::Any;
use std::sync::Arc;

/// CPU fallback. Deforms into the back frame, then flips.
pub struct SequentialBackend {
    skin: Arc<SkinData>,
    algorithm: SkinningAlgorithm,
    topology: Option<MeshTopology>,
    frames: [DeformedFrame; 2],
    front: usize,
    positions: Vec<Vec3>,
    tension: Vec<f32>,
    released: bool,
}

impl SequentialBackend {
    pub fn new(skin: Arc<SkinData>, config: &SkinningConfig) -> Self {
        let algorithm = config.algorithm.effective_for(&skin);
        let topology = config.tension.then(|| skin.topology());
        let rest = DeformedFrame::from_rest(&skin);
        let vertex_count = skin.vertex_count();
        Self {
            algorithm,
            topology,
            frames: [rest.clone(), rest],
            front: 0,
            positions: Vec::with_capacity(vertex_count),
            tension: vec![0.0; vertex_count],
            released: false,
            skin,
        }
    }

    pub fn front(&self) -> &DeformedFrame {
        &self.frames[self.front]
    }
}

impl SkinningBackend for SequentialBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Sequential
    }

    fn algorithm(&self) -> SkinningAlgorithm {
        self.algorithm
    }

    fn tension_enabled(&self) -> bool {
        self.topology.is_some()
    }

    fn dispatch(&mut self, palette: &BonePalette) -> Result<(), DispatchError> {
        if self.released {
            return Err(DispatchError::NotLoaded);
        }

        let skin = &*self.skin;
        let centers = skin.centers_of_rotation.as_deref();
        self.positions.clear();
        self.positions.extend(
            skin.vertices
                .iter()
                .zip(&skin.influences)
                .enumerate()
                .map(|(i, (vertex, influences))| {
                    let center = centers.and_then(|c| c.get(i).copied());
                    skin_vertex(
                        self.algorithm,
                        vertex.position,
                        influences,
                        center,
                        palette.as_slice(),
                    )
                }),
        );

        match &self.topology {
            Some(topology) => compute_tension(topology, &self.positions, &mut self.tension),
            None => self.tension.fill(0.0),
        }

        let back = &mut self.frames[1 - self.front];
        for ((out, &position), &tension) in back
            .vertices
            .iter_mut()
            .zip(&self.positions)
            .zip(&self.tension)
        {
            out.position = position;
            out.tension = tension;
        }
        self.front = 1 - self.front;
        Ok(())
    }

    fn frame(&self) -> Frame<'_> {
        Frame::Host(&self.frames[self.front])
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.frames = Default::default();
        self.positions = Vec::new();
        self.tension = Vec::new();
        self.topology = None;
        self.released = true;
        log::debug!("sequential backend released");
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
