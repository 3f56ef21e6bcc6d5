use std::collections::HashMap;

use anyhow::{anyhow, Result};
use bytemuck::{bytes_of, cast_slice};
use js_sys::{Object, Reflect};
use log::{debug, info};
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{
    window, HtmlCanvasElement, WebGl2RenderingContext as Gl, WebGlBuffer, WebGlProgram,
    WebGlShader, WebGlVertexArrayObject, XrRenderStateInit, XrWebGlLayer,
};

use super::shared::{
    GlobalUniform, ObjectConstants, GLSL_FRAGMENT_SHADER, GLSL_VERTEX_SHADER, KEY_LIGHT,
};
use super::{SceneRenderer, SurfaceFactory};
use crate::camera::CameraParams;
use crate::error::RenderError;
use crate::model::{MeshPrimitive, VERTEX_STRIDE};
use crate::scene::Scene;
use crate::xr::web::{describe, WebSession};

const GLOBALS_BINDING: u32 = 0;
const OBJECT_BINDING: u32 = 1;

/// WebGL2 renderer drawing into the session's `XRWebGLLayer`.
pub struct WebGlRenderer {
    gl: Gl,
    session: web_sys::XrSession,
    canvas: HtmlCanvasElement,
    program: WebGlProgram,
    globals: WebGlBuffer,
    object: WebGlBuffer,
    meshes: HashMap<(String, usize), GpuMesh>,
}

impl WebGlRenderer {
    /// Compiles the shading program for an XR compatible context.
    pub fn new(gl: Gl, canvas: HtmlCanvasElement, session: web_sys::XrSession) -> Result<Self> {
        let vertex = compile_shader(&gl, Gl::VERTEX_SHADER, GLSL_VERTEX_SHADER)?;
        let fragment = compile_shader(&gl, Gl::FRAGMENT_SHADER, GLSL_FRAGMENT_SHADER)?;
        let program = link_program(&gl, &vertex, &fragment)?;

        for (block, binding) in [("Globals", GLOBALS_BINDING), ("Object", OBJECT_BINDING)] {
            let index = gl.get_uniform_block_index(&program, block);
            if index == Gl::INVALID_INDEX {
                return Err(anyhow!("uniform block {block} missing from program"));
            }
            gl.uniform_block_binding(&program, index, binding);
        }

        let globals = create_buffer(&gl)?;
        let object = create_buffer(&gl)?;

        info!("WebGL2 renderer ready");
        Ok(Self {
            gl,
            session,
            canvas,
            program,
            globals,
            object,
            meshes: HashMap::new(),
        })
    }

    fn layer(&self) -> Option<XrWebGlLayer> {
        self.session.render_state().base_layer()
    }

    fn ensure_uploaded(
        &mut self,
        mesh_name: &str,
        index: usize,
        primitive: &MeshPrimitive,
    ) -> Result<()> {
        let key = (mesh_name.to_string(), index);
        if self.meshes.contains_key(&key) {
            return Ok(());
        }
        debug!("uploading {mesh_name} primitive {index}");
        let mesh = GpuMesh::upload(&self.gl, primitive)?;
        self.meshes.insert(key, mesh);
        Ok(())
    }

    fn upload_uniform(&self, buffer: &WebGlBuffer, binding: u32, bytes: &[u8]) {
        self.gl.bind_buffer(Gl::UNIFORM_BUFFER, Some(buffer));
        self.gl
            .buffer_data_with_u8_array(Gl::UNIFORM_BUFFER, bytes, Gl::DYNAMIC_DRAW);
        self.gl.bind_buffer_base(Gl::UNIFORM_BUFFER, binding, Some(buffer));
    }
}

impl SceneRenderer for WebGlRenderer {
    fn render(&mut self, scene: &Scene, views: &[CameraParams]) -> Result<(), RenderError> {
        if self.gl.is_context_lost() {
            return Err(RenderError::Draw("WebGL context lost".to_string()));
        }

        for node in scene.nodes() {
            for (index, primitive) in node.mesh.primitives.iter().enumerate() {
                self.ensure_uploaded(&node.mesh.name, index, primitive)
                    .map_err(|err| RenderError::Draw(format!("{err:#}")))?;
            }
        }

        let layer = self.layer();
        let framebuffer = layer.as_ref().and_then(|layer| layer.framebuffer());
        let (width, height) = self.surface_size();

        let gl = &self.gl;
        gl.bind_framebuffer(Gl::FRAMEBUFFER, framebuffer.as_ref());
        gl.enable(Gl::DEPTH_TEST);
        gl.enable(Gl::BLEND);
        gl.blend_func(Gl::SRC_ALPHA, Gl::ONE_MINUS_SRC_ALPHA);
        // Transparent so the camera feed shows through.
        gl.clear_color(0.0, 0.0, 0.0, 0.0);
        gl.clear(Gl::COLOR_BUFFER_BIT | Gl::DEPTH_BUFFER_BIT);
        gl.use_program(Some(&self.program));

        for camera in views {
            match camera.viewport {
                Some(vp) => gl.viewport(vp.x, vp.y, vp.width as i32, vp.height as i32),
                None => gl.viewport(0, 0, width as i32, height as i32),
            }
            let globals = GlobalUniform::new(camera, &KEY_LIGHT);
            self.upload_uniform(&self.globals, GLOBALS_BINDING, bytes_of(&globals));

            for node in scene.nodes() {
                for (index, primitive) in node.mesh.primitives.iter().enumerate() {
                    let Some(mesh) = self.meshes.get(&(node.mesh.name.clone(), index)) else {
                        continue;
                    };
                    let constants = ObjectConstants::new(node, primitive.base_color);
                    self.upload_uniform(&self.object, OBJECT_BINDING, bytes_of(&constants));
                    gl.bind_vertex_array(Some(&mesh.vao));
                    gl.draw_elements_with_i32(Gl::TRIANGLES, mesh.index_count, Gl::UNSIGNED_INT, 0);
                }
            }
        }
        gl.bind_vertex_array(None);
        Ok(())
    }

    fn surface_size(&self) -> (u32, u32) {
        match self.layer() {
            Some(layer) => (layer.framebuffer_width(), layer.framebuffer_height()),
            None => (self.canvas.width().max(1), self.canvas.height().max(1)),
        }
    }
}

struct GpuMesh {
    vao: WebGlVertexArrayObject,
    _vertices: WebGlBuffer,
    _indices: WebGlBuffer,
    index_count: i32,
}

impl GpuMesh {
    fn upload(gl: &Gl, primitive: &MeshPrimitive) -> Result<Self> {
        let vao = gl
            .create_vertex_array()
            .ok_or_else(|| anyhow!("failed to create vertex array"))?;
        gl.bind_vertex_array(Some(&vao));

        let vertices = create_buffer(gl)?;
        gl.bind_buffer(Gl::ARRAY_BUFFER, Some(&vertices));
        gl.buffer_data_with_u8_array(
            Gl::ARRAY_BUFFER,
            cast_slice(&primitive.vertices),
            Gl::STATIC_DRAW,
        );

        let stride = (VERTEX_STRIDE * std::mem::size_of::<f32>()) as i32;
        gl.enable_vertex_attrib_array(0);
        gl.vertex_attrib_pointer_with_i32(0, 3, Gl::FLOAT, false, stride, 0);
        gl.enable_vertex_attrib_array(1);
        gl.vertex_attrib_pointer_with_i32(1, 3, Gl::FLOAT, false, stride, 12);

        let indices = create_buffer(gl)?;
        gl.bind_buffer(Gl::ELEMENT_ARRAY_BUFFER, Some(&indices));
        gl.buffer_data_with_u8_array(
            Gl::ELEMENT_ARRAY_BUFFER,
            cast_slice(&primitive.indices),
            Gl::STATIC_DRAW,
        );

        gl.bind_vertex_array(None);
        Ok(Self {
            vao,
            _vertices: vertices,
            _indices: indices,
            index_count: primitive.indices.len() as i32,
        })
    }
}

/// Creates the page canvas, an XR compatible WebGL2 context and the
/// `XRWebGLLayer` the session renders into.
#[derive(Debug, Clone, Default)]
pub struct WebGlSurfaces;

impl WebGlSurfaces {
    pub fn new() -> Self {
        Self
    }

    fn build(&self, session: &WebSession) -> Result<WebGlRenderer> {
        let window = window().ok_or_else(|| anyhow!("window not available"))?;
        let document = window
            .document()
            .ok_or_else(|| anyhow!("document not available"))?;
        let canvas = document
            .create_element("canvas")
            .map_err(|err| anyhow!("failed to create canvas: {}", describe(&err)))?
            .dyn_into::<HtmlCanvasElement>()
            .map_err(|_| anyhow!("element is not a canvas"))?;

        let width = window
            .inner_width()
            .ok()
            .and_then(|value| value.as_f64())
            .unwrap_or(1.0);
        let height = window
            .inner_height()
            .ok()
            .and_then(|value| value.as_f64())
            .unwrap_or(1.0);
        canvas.set_width(width.max(1.0) as u32);
        canvas.set_height(height.max(1.0) as u32);

        let body = document
            .body()
            .ok_or_else(|| anyhow!("document has no body"))?;
        body.append_child(&canvas)
            .map_err(|err| anyhow!("failed to attach canvas: {}", describe(&err)))?;

        let options = Object::new();
        Reflect::set(&options, &"xrCompatible".into(), &JsValue::TRUE)
            .map_err(|err| anyhow!("failed to build context options: {}", describe(&err)))?;
        Reflect::set(&options, &"alpha".into(), &JsValue::TRUE)
            .map_err(|err| anyhow!("failed to build context options: {}", describe(&err)))?;
        let gl = canvas
            .get_context_with_context_options("webgl2", &options)
            .map_err(|err| anyhow!("failed to query webgl2 context: {}", describe(&err)))?
            .ok_or_else(|| anyhow!("canvas does not support webgl2"))?
            .dyn_into::<Gl>()
            .map_err(|_| anyhow!("failed to cast webgl2 context"))?;

        let layer = XrWebGlLayer::new_with_web_gl2_rendering_context(session.raw(), &gl)
            .map_err(|err| anyhow!("failed to create XRWebGLLayer: {}", describe(&err)))?;
        let state = XrRenderStateInit::new();
        state.set_base_layer(Some(&layer));
        session.raw().update_render_state_with_state(&state);

        WebGlRenderer::new(gl, canvas, session.raw().clone())
    }
}

impl SurfaceFactory<WebSession> for WebGlSurfaces {
    type Renderer = WebGlRenderer;

    async fn create(&self, session: &WebSession) -> Result<WebGlRenderer, RenderError> {
        self.build(session)
            .map_err(|err| RenderError::Surface(format!("{err:#}")))
    }
}

fn create_buffer(gl: &Gl) -> Result<WebGlBuffer> {
    gl.create_buffer()
        .ok_or_else(|| anyhow!("failed to create buffer"))
}

fn compile_shader(gl: &Gl, kind: u32, source: &str) -> Result<WebGlShader> {
    let shader = gl
        .create_shader(kind)
        .ok_or_else(|| anyhow!("failed to create shader"))?;
    gl.shader_source(&shader, source);
    gl.compile_shader(&shader);
    let compiled = gl
        .get_shader_parameter(&shader, Gl::COMPILE_STATUS)
        .as_bool()
        .unwrap_or(false);
    if compiled {
        Ok(shader)
    } else {
        let log = gl.get_shader_info_log(&shader).unwrap_or_default();
        gl.delete_shader(Some(&shader));
        Err(anyhow!("shader compilation failed: {log}"))
    }
}

fn link_program(gl: &Gl, vertex: &WebGlShader, fragment: &WebGlShader) -> Result<WebGlProgram> {
    let program = gl
        .create_program()
        .ok_or_else(|| anyhow!("failed to create program"))?;
    gl.attach_shader(&program, vertex);
    gl.attach_shader(&program, fragment);
    gl.link_program(&program);
    let linked = gl
        .get_program_parameter(&program, Gl::LINK_STATUS)
        .as_bool()
        .unwrap_or(false);
    if linked {
        Ok(program)
    } else {
        let log = gl.get_program_info_log(&program).unwrap_or_default();
        Err(anyhow!("program link failed: {log}"))
    }
}
